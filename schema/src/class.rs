//! Entity classes announced by the demo.

use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use wire::proto::CDemoClassInfo;

use crate::error::{SchemaError, SchemaResult};
use crate::registry::SerializerRegistry;
use crate::serializer::Serializer;

/// An entity class bound to its serializer.
#[derive(Debug)]
pub struct ClassInfo {
    pub id: i32,
    pub name: String,
    pub serializer: Rc<Serializer>,
}

/// Classes by id and by network name.
#[derive(Debug, Default)]
pub struct ClassRegistry {
    by_id: BTreeMap<i32, Rc<ClassInfo>>,
    by_name: HashMap<String, i32>,
    class_id_bits: u8,
}

impl ClassRegistry {
    /// Binds every announced class to the latest serializer of the same name.
    ///
    /// `max_classes` comes from the server info; without it the id width is
    /// derived from the number of classes.
    pub fn from_proto(
        info: &CDemoClassInfo,
        serializers: &SerializerRegistry,
        max_classes: Option<u32>,
    ) -> SchemaResult<Self> {
        let mut registry = Self::default();
        for class in &info.classes {
            let serializer = serializers.latest(&class.network_name).ok_or_else(|| {
                SchemaError::UnknownSerializer {
                    name: class.network_name.clone(),
                    version: -1,
                }
            })?;
            registry.insert(ClassInfo {
                id: class.class_id,
                name: class.network_name.clone(),
                serializer: Rc::clone(serializer),
            });
        }
        let count = u32::try_from(registry.len()).unwrap_or(u32::MAX);
        registry.set_max_classes(max_classes.unwrap_or(count));
        tracing::debug!(
            classes = registry.len(),
            class_id_bits = registry.class_id_bits,
            "class registry built"
        );
        Ok(registry)
    }

    pub fn insert(&mut self, class: ClassInfo) {
        self.by_name.insert(class.name.clone(), class.id);
        self.by_id.insert(class.id, Rc::new(class));
    }

    /// Sets the width of class ids in entity creates: `floor(log2(max)) + 1`.
    pub fn set_max_classes(&mut self, max_classes: u32) {
        self.class_id_bits = class_id_bits(max_classes);
    }

    #[must_use]
    pub const fn class_id_bits(&self) -> u8 {
        self.class_id_bits
    }

    pub fn get(&self, id: i32) -> SchemaResult<&Rc<ClassInfo>> {
        self.by_id.get(&id).ok_or(SchemaError::UnknownClass { id })
    }

    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<&Rc<ClassInfo>> {
        self.by_name.get(name).and_then(|id| self.by_id.get(id))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Classes in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Rc<ClassInfo>> {
        self.by_id.values()
    }
}

fn class_id_bits(max_classes: u32) -> u8 {
    // Bounded by u32::BITS, so the narrowing is lossless.
    (u32::BITS - max_classes.leading_zeros()) as u8
}
