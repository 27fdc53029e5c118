//! The live view of a demo: everything applied so far, in stream order.

use codec::{CodecLimits, EntityStore, StringTables};
use schema::{ClassRegistry, SerializerRegistry};
use wire::proto::{CDemoFileHeader, CsvcMsgServerInfo};

use crate::schema_state::SchemaState;

/// Server settings announced at signon.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ServerInfo {
    pub max_classes: i32,
    pub tick_interval: f32,
    pub map_name: String,
    pub game_dir: String,
}

impl From<&CsvcMsgServerInfo> for ServerInfo {
    fn from(msg: &CsvcMsgServerInfo) -> Self {
        Self {
            max_classes: msg.max_classes,
            tick_interval: msg.tick_interval,
            map_name: msg.map_name.clone(),
            game_dir: msg.game_dir.clone(),
        }
    }
}

/// Demo state owned by the dispatching thread.
///
/// Interceptors receive it by shared reference; only the dispatcher
/// mutates it.
#[derive(Debug)]
pub struct Demo {
    pub(crate) header: Option<CDemoFileHeader>,
    pub(crate) server_info: Option<ServerInfo>,
    pub(crate) tick: u32,
    pub(crate) schema: SchemaState,
    pub(crate) string_tables: StringTables,
    pub(crate) entities: EntityStore,
}

impl Demo {
    #[must_use]
    pub fn new(limits: CodecLimits) -> Self {
        Self {
            header: None,
            server_info: None,
            tick: 0,
            schema: SchemaState::new(),
            string_tables: StringTables::new(),
            entities: EntityStore::new(limits),
        }
    }

    #[must_use]
    pub const fn header(&self) -> Option<&CDemoFileHeader> {
        self.header.as_ref()
    }

    #[must_use]
    pub const fn server_info(&self) -> Option<&ServerInfo> {
        self.server_info.as_ref()
    }

    /// Tick of the last packet or `net_Tick` applied.
    #[must_use]
    pub const fn tick(&self) -> u32 {
        self.tick
    }

    #[must_use]
    pub const fn serializers(&self) -> &SerializerRegistry {
        self.schema.serializers()
    }

    #[must_use]
    pub const fn classes(&self) -> &ClassRegistry {
        self.schema.classes()
    }

    #[must_use]
    pub const fn string_tables(&self) -> &StringTables {
        &self.string_tables
    }

    #[must_use]
    pub const fn entities(&self) -> &EntityStore {
        &self.entities
    }

    /// Mutable access for lazy name resolution (`Entity::get`,
    /// `EntityStore::follow_handle`).
    pub fn entities_mut(&mut self) -> &mut EntityStore {
        &mut self.entities
    }
}
