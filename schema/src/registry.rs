//! Serializer registry built from a flattened serializer message.

use std::collections::HashMap;
use std::rc::Rc;

use wire::proto::{CsvcMsgFlattenedSerializer, ProtoFlattenedSerializerFieldT};

use crate::decoder::FieldProps;
use crate::error::{SchemaError, SchemaResult};
use crate::serializer::{Field, Serializer};

/// All serializers announced by a demo, by name and version.
///
/// Serializers hold `Rc`s and memoize lookups in `RefCell`s, so a registry
/// stays on the thread that built it. Threads that need one build their own
/// from the shared message.
#[derive(Debug, Default)]
pub struct SerializerRegistry {
    by_version: HashMap<(String, i32), Rc<Serializer>>,
    latest: HashMap<String, Rc<Serializer>>,
}

impl SerializerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds every serializer in the message.
    ///
    /// Nested serializers must appear before the serializers that embed
    /// them. Field definitions shared between serializers are built once.
    pub fn from_proto(msg: &CsvcMsgFlattenedSerializer) -> SchemaResult<Self> {
        let mut registry = Self::new();
        let mut fields: Vec<Option<Rc<Field>>> = vec![None; msg.fields.len()];

        for proto in &msg.serializers {
            let name = symbol(msg, proto.serializer_name_sym)?;
            let mut members = Vec::with_capacity(proto.fields_index.len());
            for &index in &proto.fields_index {
                let slot = usize::try_from(index)
                    .ok()
                    .filter(|&i| i < fields.len())
                    .ok_or(SchemaError::UnknownSymbol { index })?;
                let field = match &fields[slot] {
                    Some(field) => Rc::clone(field),
                    None => {
                        let field = Rc::new(registry.build_field(msg, &msg.fields[slot])?);
                        fields[slot] = Some(Rc::clone(&field));
                        field
                    }
                };
                members.push(field);
            }
            registry.insert(Serializer::new(name, proto.serializer_version, members));
        }

        tracing::debug!(
            serializers = registry.by_version.len(),
            fields = msg.fields.len(),
            symbols = msg.symbols.len(),
            "serializer registry built"
        );
        Ok(registry)
    }

    fn build_field(
        &self,
        msg: &CsvcMsgFlattenedSerializer,
        proto: &ProtoFlattenedSerializerFieldT,
    ) -> SchemaResult<Field> {
        let name = symbol(msg, proto.var_name_sym)?;
        let var_type = symbol(msg, proto.var_type_sym)?;
        let encoder = proto
            .var_encoder_sym
            .map(|sym| symbol(msg, sym).map(str::to_owned))
            .transpose()?;
        let props = FieldProps {
            bit_count: proto.bit_count,
            low_value: proto.low_value,
            high_value: proto.high_value,
            encode_flags: proto.encode_flags,
            encoder,
        };
        let nested = match proto.field_serializer_name_sym {
            Some(sym) => {
                let nested_name = symbol(msg, sym)?;
                let version = proto.field_serializer_version.unwrap_or(0);
                let serializer =
                    self.get(nested_name, version)
                        .ok_or_else(|| SchemaError::UnknownSerializer {
                            name: nested_name.to_owned(),
                            version,
                        })?;
                Some(Rc::clone(serializer))
            }
            None => None,
        };
        Field::from_declaration(name, var_type, &props, nested)
    }

    /// Adds a serializer; the highest version per name is the latest.
    pub fn insert(&mut self, serializer: Serializer) -> Rc<Serializer> {
        let serializer = Rc::new(serializer);
        let name = serializer.name().to_owned();
        let newer = self
            .latest
            .get(&name)
            .map_or(true, |current| current.version() <= serializer.version());
        if newer {
            self.latest.insert(name.clone(), Rc::clone(&serializer));
        }
        self.by_version
            .insert((name, serializer.version()), Rc::clone(&serializer));
        serializer
    }

    #[must_use]
    pub fn get(&self, name: &str, version: i32) -> Option<&Rc<Serializer>> {
        self.by_version.get(&(name.to_owned(), version))
    }

    /// Highest version registered under `name`.
    #[must_use]
    pub fn latest(&self, name: &str) -> Option<&Rc<Serializer>> {
        self.latest.get(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_version.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_version.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rc<Serializer>> {
        self.by_version.values()
    }
}

fn symbol(msg: &CsvcMsgFlattenedSerializer, index: i32) -> SchemaResult<&str> {
    usize::try_from(index)
        .ok()
        .and_then(|i| msg.symbols.get(i))
        .map(String::as_str)
        .ok_or(SchemaError::UnknownSymbol { index })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serializer::FieldModel;
    use wire::proto::ProtoFlattenedSerializerT;

    fn field(type_sym: i32, name_sym: i32) -> ProtoFlattenedSerializerFieldT {
        ProtoFlattenedSerializerFieldT {
            var_type_sym: type_sym,
            var_name_sym: name_sym,
            ..Default::default()
        }
    }

    fn message() -> CsvcMsgFlattenedSerializer {
        let symbols = [
            "CItem",      // 0
            "int32",      // 1
            "m_iCount",   // 2
            "CUnit",      // 3
            "CUtlVectorEmbeddedNetworkVar< CItem >", // 4
            "m_vecItems", // 5
            "m_iHealth",  // 6
        ];
        let mut items = field(4, 5);
        items.field_serializer_name_sym = Some(0);
        items.field_serializer_version = Some(0);
        CsvcMsgFlattenedSerializer {
            symbols: symbols.iter().map(|s| (*s).to_owned()).collect(),
            fields: vec![field(1, 2), field(1, 6), items],
            serializers: vec![
                ProtoFlattenedSerializerT {
                    serializer_name_sym: 0,
                    serializer_version: 0,
                    fields_index: vec![0],
                },
                ProtoFlattenedSerializerT {
                    serializer_name_sym: 3,
                    serializer_version: 1,
                    fields_index: vec![1, 2, 0],
                },
            ],
        }
    }

    #[test]
    fn builds_nested_serializers() {
        let registry = SerializerRegistry::from_proto(&message()).unwrap();
        assert_eq!(registry.len(), 2);
        let unit = registry.latest("CUnit").unwrap();
        assert_eq!(unit.version(), 1);
        let models: Vec<_> = unit.fields().iter().map(|f| f.model()).collect();
        assert_eq!(
            models,
            [FieldModel::Simple, FieldModel::VariableTable, FieldModel::Simple]
        );
        let nested = unit.fields()[1].serializer().unwrap();
        assert_eq!(nested.name(), "CItem");
    }

    #[test]
    fn shares_field_definitions() {
        let registry = SerializerRegistry::from_proto(&message()).unwrap();
        let item = registry.latest("CItem").unwrap();
        let unit = registry.latest("CUnit").unwrap();
        assert!(Rc::ptr_eq(&item.fields()[0], &unit.fields()[2]));
    }

    #[test]
    fn unknown_nested_serializer_fails() {
        let mut msg = message();
        msg.fields[2].field_serializer_version = Some(7);
        let err = SerializerRegistry::from_proto(&msg).unwrap_err();
        assert_eq!(
            err,
            SchemaError::UnknownSerializer {
                name: "CItem".into(),
                version: 7,
            }
        );
    }

    #[test]
    fn bad_symbol_fails() {
        let mut msg = message();
        msg.fields[0].var_name_sym = 99;
        assert_eq!(
            SerializerRegistry::from_proto(&msg).unwrap_err(),
            SchemaError::UnknownSymbol { index: 99 }
        );
    }

    #[test]
    fn latest_tracks_highest_version() {
        let mut registry = SerializerRegistry::new();
        registry.insert(Serializer::new("CUnit", 2, Vec::new()));
        registry.insert(Serializer::new("CUnit", 1, Vec::new()));
        assert_eq!(registry.latest("CUnit").unwrap().version(), 2);
        assert!(registry.get("CUnit", 1).is_some());
    }
}
