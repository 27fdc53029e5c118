//! Serializer and class registries rebuilt from schema packets.

use std::sync::Arc;

use schema::{ClassRegistry, SerializerRegistry};
use tracing::debug;
use wire::proto::CDemoClassInfo;

use crate::error::ParserResult;
use crate::protocol::SchemaUpdate;

/// Registries for one thread, plus what is needed to rebuild them.
#[derive(Debug, Default)]
pub struct SchemaState {
    serializers: SerializerRegistry,
    classes: ClassRegistry,
    class_info: Option<Arc<CDemoClassInfo>>,
    max_classes: Option<u32>,
}

impl SchemaState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds from a schema packet. New send tables also rebuild the
    /// classes, since classes point at serializers.
    pub fn apply(&mut self, update: &SchemaUpdate) -> ParserResult<()> {
        match update {
            SchemaUpdate::SendTables(tables) => {
                self.serializers = SerializerRegistry::from_proto(&tables.flattened_serializer()?)?;
                debug!(serializers = self.serializers.len(), "serializers built");
                if let Some(info) = self.class_info.clone() {
                    self.rebuild_classes(&info)?;
                }
            }
            SchemaUpdate::ClassInfo(info) => {
                self.rebuild_classes(info)?;
                self.class_info = Some(Arc::clone(info));
            }
        }
        Ok(())
    }

    fn rebuild_classes(&mut self, info: &CDemoClassInfo) -> ParserResult<()> {
        self.classes = ClassRegistry::from_proto(info, &self.serializers, self.max_classes)?;
        Ok(())
    }

    /// Records the class count announced by server info.
    pub fn set_max_classes(&mut self, max_classes: u32) {
        self.max_classes = Some(max_classes);
        self.classes.set_max_classes(max_classes);
    }

    #[must_use]
    pub const fn max_classes(&self) -> Option<u32> {
        self.max_classes
    }

    #[must_use]
    pub const fn serializers(&self) -> &SerializerRegistry {
        &self.serializers
    }

    #[must_use]
    pub const fn classes(&self) -> &ClassRegistry {
        &self.classes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wire::proto::c_demo_class_info::ClassT;

    #[test]
    fn class_info_without_serializers_fails() {
        let mut state = SchemaState::new();
        let info = CDemoClassInfo {
            classes: vec![ClassT {
                class_id: 0,
                network_name: "CWorld".into(),
                table_name: String::new(),
            }],
        };
        let err = state
            .apply(&SchemaUpdate::ClassInfo(Arc::new(info)))
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Schema);
    }

    #[test]
    fn max_classes_survives_rebuilds() {
        let mut state = SchemaState::new();
        state.set_max_classes(300);
        state
            .apply(&SchemaUpdate::ClassInfo(Arc::new(CDemoClassInfo::default())))
            .unwrap();
        assert_eq!(state.max_classes(), Some(300));
        assert_eq!(state.classes().class_id_bits(), 9);
    }
}
