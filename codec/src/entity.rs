//! Entities and the mutations applied to them.

use std::collections::HashMap;
use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};
use schema::{ClassInfo, FieldPath, FieldValue};

use crate::error::CodecResult;
use crate::types::EntityHandle;

/// What a decoded entity record does to its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EntityOp {
    Create,
    Update,
    Delete,
    Leave,
}

impl EntityOp {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Leave => "leave",
        }
    }
}

/// One property change.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityMutation {
    pub path: FieldPath,
    pub value: FieldValue,
}

/// Decoded changes for one entity slot in one packet.
///
/// Keyed by slot index and class id so it can cross threads without
/// carrying schema references.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityDelta {
    pub op: EntityOp,
    pub index: u32,
    pub serial: u32,
    pub class_id: i32,
    pub mutations: Vec<EntityMutation>,
}

/// A live (or left) entity.
#[derive(Debug)]
pub struct Entity {
    index: u32,
    serial: u32,
    class: Rc<ClassInfo>,
    active: bool,
    state: HashMap<FieldPath, FieldValue>,
    dirty: IndexSet<FieldPath>,
    snapshot: IndexMap<String, FieldValue>,
    resolved_names: usize,
}

impl Entity {
    #[must_use]
    pub fn new(index: u32, serial: u32, class: Rc<ClassInfo>) -> Self {
        Self {
            index,
            serial,
            class,
            active: true,
            state: HashMap::new(),
            dirty: IndexSet::new(),
            snapshot: IndexMap::new(),
            resolved_names: 0,
        }
    }

    #[must_use]
    pub const fn index(&self) -> u32 {
        self.index
    }

    #[must_use]
    pub const fn serial(&self) -> u32 {
        self.serial
    }

    #[must_use]
    pub const fn handle(&self) -> EntityHandle {
        EntityHandle::new(self.index, self.serial)
    }

    #[must_use]
    pub fn class(&self) -> &Rc<ClassInfo> {
        &self.class
    }

    #[must_use]
    pub fn class_name(&self) -> &str {
        &self.class.name
    }

    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    pub(crate) fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// Stores each value and marks its path dirty.
    pub fn apply<'m>(&mut self, mutations: impl IntoIterator<Item = &'m EntityMutation>) {
        for m in mutations {
            self.state.insert(m.path, m.value.clone());
            self.dirty.insert(m.path);
        }
    }

    /// Raw value by field path.
    #[must_use]
    pub fn get_path(&self, path: FieldPath) -> Option<&FieldValue> {
        self.state.get(&path)
    }

    /// Number of stored field paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }

    /// Named view of the entity's state.
    ///
    /// Only paths changed since the previous call are resolved to names and
    /// merged in. A path leaves the dirty set once it is merged, so a path
    /// that fails to resolve stays pending along with every path after it.
    pub fn unpack_flattened(&mut self) -> CodecResult<&IndexMap<String, FieldValue>> {
        let serializer = &self.class.serializer;
        let mut merged = 0;
        let mut result = Ok(());
        for &path in &self.dirty {
            if let Some(value) = self.state.get(&path) {
                match serializer.name_for_field_path(path) {
                    Ok(name) => {
                        self.resolved_names += 1;
                        self.snapshot.insert(name, value.clone());
                    }
                    Err(err) => {
                        result = Err(err);
                        break;
                    }
                }
            }
            merged += 1;
        }
        self.dirty.drain(..merged);
        result?;
        Ok(&self.snapshot)
    }

    /// Named property lookup; brings the snapshot up to date first.
    pub fn get(&mut self, name: &str) -> CodecResult<Option<&FieldValue>> {
        Ok(self.unpack_flattened()?.get(name))
    }

    /// Reads a handle-typed property such as `m_hOwnerEntity`.
    ///
    /// The handle is resolved through the store at read time; entities never
    /// hold references to each other.
    pub fn get_handle(&mut self, name: &str) -> CodecResult<Option<EntityHandle>> {
        Ok(self
            .get(name)?
            .and_then(FieldValue::as_handle)
            .map(EntityHandle::from_raw))
    }

    /// How many path names have been resolved over the entity's lifetime.
    #[must_use]
    pub const fn resolved_names(&self) -> usize {
        self.resolved_names
    }

    /// Number of changed paths not yet merged into the named snapshot.
    #[must_use]
    pub fn pending_changes(&self) -> usize {
        self.dirty.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schema::{Field, FieldProps, Serializer};

    fn class() -> Rc<ClassInfo> {
        let field = |name: &str, ty: &str| {
            Rc::new(Field::from_declaration(name, ty, &FieldProps::default(), None).unwrap())
        };
        Rc::new(ClassInfo {
            id: 1,
            name: "CUnit".into(),
            serializer: Rc::new(Serializer::new(
                "CUnit",
                0,
                vec![
                    field("A", "int32"),
                    field("B", "int32"),
                    field("m_hOwnerEntity", "CHandle< CBaseEntity >"),
                ],
            )),
        })
    }

    fn m(index: u16, value: i64) -> EntityMutation {
        EntityMutation {
            path: FieldPath::new(&[index]).unwrap(),
            value: FieldValue::Signed(value),
        }
    }

    #[test]
    fn unpack_is_incremental() {
        let mut e = Entity::new(3, 1, class());
        e.apply(&[m(0, 1), m(1, 2)]);
        let snap = e.unpack_flattened().unwrap().clone();
        assert_eq!(snap.get("A"), Some(&FieldValue::Signed(1)));
        assert_eq!(snap.get("B"), Some(&FieldValue::Signed(2)));
        assert_eq!(e.resolved_names(), 2);

        e.apply(&[m(0, 3)]);
        assert_eq!(e.pending_changes(), 1);
        let snap = e.unpack_flattened().unwrap();
        assert_eq!(snap.get("A"), Some(&FieldValue::Signed(3)));
        assert_eq!(snap.get("B"), Some(&FieldValue::Signed(2)));
        assert_eq!(e.resolved_names(), 3);
    }

    #[test]
    fn repeated_changes_resolve_once() {
        let mut e = Entity::new(3, 1, class());
        e.apply(&[m(0, 1), m(0, 2), m(0, 5)]);
        e.unpack_flattened().unwrap();
        assert_eq!(e.resolved_names(), 1);
        assert_eq!(e.get("A").unwrap(), Some(&FieldValue::Signed(5)));
    }

    #[test]
    fn unresolved_path_keeps_later_changes_pending() {
        let mut e = Entity::new(3, 1, class());
        e.apply(&[m(0, 1), m(9, 4), m(1, 2)]);
        assert!(e.unpack_flattened().is_err());
        assert_eq!(e.pending_changes(), 2);
        assert_eq!(e.resolved_names(), 1);

        assert!(e.unpack_flattened().is_err());
        assert_eq!(e.resolved_names(), 1);
        assert_eq!(e.get_path(FieldPath::new(&[1]).unwrap()), Some(&FieldValue::Signed(2)));
    }

    #[test]
    fn reads_handles() {
        let mut e = Entity::new(3, 1, class());
        e.apply(&[EntityMutation {
            path: FieldPath::new(&[2]).unwrap(),
            value: FieldValue::Unsigned(u64::from(EntityHandle::new(9, 2).raw())),
        }]);
        assert_eq!(e.get_handle("m_hOwnerEntity").unwrap(), Some(EntityHandle::new(9, 2)));
        assert_eq!(e.get_handle("missing").unwrap(), None);
    }

    #[test]
    fn handle_combines_index_and_serial() {
        let e = Entity::new(7, 3, class());
        assert_eq!(e.handle().raw(), 3 << 14 | 7);
        assert_eq!(e.class_name(), "CUnit");
        assert!(e.is_active());
    }
}
