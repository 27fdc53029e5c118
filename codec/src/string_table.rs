//! String tables: keyed blobs the server replicates alongside entities.
//!
//! The `instancebaseline` table is the one the entity decoder depends on:
//! its keys are decimal class ids and its values are the field streams that
//! seed newly created entities of that class.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use bitstream::BitReader;
use schema::MAX_STRING_BYTES;
use wire::proto::{CDemoStringTables, CsvcMsgCreateStringTable, CsvcMsgUpdateStringTable};

use crate::error::{CodecError, CodecResult, LimitKind};
use crate::limits::CodecLimits;

/// Name of the table holding per-class entity baselines.
pub const INSTANCE_BASELINE_TABLE: &str = "instancebaseline";

/// Table flag marking per-value Snappy compression.
const FLAG_VALUES_COMPRESSED: i32 = 1 << 0;

static NEXT_REVISION: AtomicU64 = AtomicU64::new(1);

/// Revisions are unique across every table in the process, so a table that
/// is dropped and created again never repeats a revision seen before.
fn next_revision() -> u64 {
    NEXT_REVISION.fetch_add(1, Ordering::Relaxed)
}

/// One table entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StringTableEntry {
    pub key: String,
    pub value: Vec<u8>,
}

/// A named table of entries indexed by position.
#[derive(Debug, Clone)]
pub struct StringTable {
    id: usize,
    name: String,
    user_data_fixed_size: bool,
    user_data_size_bits: u32,
    flags: i32,
    using_varint_bitcounts: bool,
    entries: BTreeMap<u32, StringTableEntry>,
    revision: u64,
}

impl StringTable {
    fn from_create(id: usize, msg: &CsvcMsgCreateStringTable) -> Self {
        Self {
            id,
            name: msg.name.clone(),
            user_data_fixed_size: msg.user_data_fixed_size,
            user_data_size_bits: u32::try_from(msg.user_data_size_bits).unwrap_or(0),
            flags: msg.flags,
            using_varint_bitcounts: msg.using_varint_bitcounts,
            entries: BTreeMap::new(),
            revision: next_revision(),
        }
    }

    #[must_use]
    pub const fn id(&self) -> usize {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Changes whenever the table's entries change. Unique process-wide.
    #[must_use]
    pub const fn revision(&self) -> u64 {
        self.revision
    }

    #[must_use]
    pub fn get(&self, index: u32) -> Option<&StringTableEntry> {
        self.entries.get(&index)
    }

    #[must_use]
    pub fn get_by_key(&self, key: &str) -> Option<&StringTableEntry> {
        self.entries.values().find(|entry| entry.key == key)
    }

    /// Entries in index order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &StringTableEntry)> {
        self.entries.iter().map(|(index, entry)| (*index, entry))
    }

    /// Decodes an entry stream and merges it into the table.
    ///
    /// Existing entries keep their key unless a new non-empty one is sent,
    /// and keep their value unless a new non-empty one is sent.
    pub fn apply_entries(
        &mut self,
        data: &[u8],
        count: usize,
        limits: &CodecLimits,
    ) -> CodecResult<usize> {
        let items = self.parse_entries(data, count, limits)?;
        let changed = items.len();
        for (index, item) in items {
            match self.entries.get_mut(&index) {
                Some(entry) => {
                    if !item.key.is_empty() {
                        entry.key = item.key;
                    }
                    if !item.value.is_empty() {
                        entry.value = item.value;
                    }
                }
                None => {
                    if self.entries.len() >= limits.max_string_table_entries {
                        return Err(CodecError::LimitsExceeded {
                            kind: LimitKind::StringTableEntries,
                            limit: limits.max_string_table_entries,
                            actual: self.entries.len() + 1,
                        });
                    }
                    self.entries.insert(index, item);
                }
            }
        }
        if changed > 0 {
            self.revision = next_revision();
        }
        Ok(changed)
    }

    fn parse_entries(
        &self,
        data: &[u8],
        count: usize,
        limits: &CodecLimits,
    ) -> CodecResult<Vec<(u32, StringTableEntry)>> {
        if data.is_empty() {
            return Ok(Vec::new());
        }
        if count > limits.max_string_table_entries {
            return Err(CodecError::LimitsExceeded {
                kind: LimitKind::StringTableEntries,
                limit: limits.max_string_table_entries,
                actual: count,
            });
        }

        let mut reader = BitReader::new(data);
        let mut items = Vec::with_capacity(count);
        let mut history: VecDeque<String> = VecDeque::with_capacity(limits.key_history);
        let mut index = u32::MAX;

        for _ in 0..count {
            index = if reader.read_bit()? {
                index.wrapping_add(1)
            } else {
                reader.read_varu32()?.wrapping_add(1)
            };

            let mut key = String::new();
            if reader.read_bit()? {
                if reader.read_bit()? {
                    let position = reader.read_bits(5)? as usize;
                    let length = reader.read_bits(5)? as usize;
                    if let Some(previous) = history.get(position) {
                        let prefix = previous.get(..length).unwrap_or(previous);
                        key.push_str(prefix);
                    }
                    key.push_str(&reader.read_cstring(MAX_STRING_BYTES)?);
                } else {
                    key = reader.read_cstring(MAX_STRING_BYTES)?;
                }
                if history.len() >= limits.key_history {
                    history.pop_front();
                }
                history.push_back(key.clone());
            }

            let mut value = Vec::new();
            if reader.read_bit()? {
                let mut compressed = false;
                let bits = if self.user_data_fixed_size {
                    self.user_data_size_bits as usize
                } else {
                    if self.flags & FLAG_VALUES_COMPRESSED != 0 {
                        compressed = reader.read_bit()?;
                    }
                    let bytes = if self.using_varint_bitcounts {
                        reader.read_ubit_var()?
                    } else {
                        reader.read_bits(17)?
                    };
                    bytes as usize * 8
                };
                value = reader.read_bits_as_bytes(bits)?;
                if compressed {
                    value = wire::decompress(&value)?;
                }
            }

            items.push((index, StringTableEntry { key, value }));
        }
        Ok(items)
    }

    fn replace_from_snapshot(&mut self, items: &[wire::proto::c_demo_string_tables::ItemsT]) {
        for (position, item) in items.iter().enumerate() {
            let Ok(index) = u32::try_from(position) else {
                break;
            };
            self.entries.insert(
                index,
                StringTableEntry {
                    key: item.str.clone(),
                    value: item.data.clone(),
                },
            );
        }
        self.revision = next_revision();
    }
}

/// All string tables of a demo, by creation order and by name.
#[derive(Debug, Clone, Default)]
pub struct StringTables {
    tables: Vec<StringTable>,
    by_name: HashMap<String, usize>,
}

impl StringTables {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a table and decodes its initial entries. Returns the table id.
    pub fn create(
        &mut self,
        msg: &CsvcMsgCreateStringTable,
        limits: &CodecLimits,
    ) -> CodecResult<usize> {
        let id = self.tables.len();
        let mut table = StringTable::from_create(id, msg);
        let count = usize::try_from(msg.num_entries).unwrap_or(0);
        if msg.data_compressed {
            let data = wire::decompress(&msg.string_data)?;
            table.apply_entries(&data, count, limits)?;
        } else {
            table.apply_entries(&msg.string_data, count, limits)?;
        }
        tracing::trace!(table = %table.name, id, entries = table.len(), "string table created");
        self.by_name.insert(table.name.clone(), id);
        self.tables.push(table);
        Ok(id)
    }

    /// Applies an incremental update to an existing table.
    pub fn update(
        &mut self,
        msg: &CsvcMsgUpdateStringTable,
        limits: &CodecLimits,
    ) -> CodecResult<usize> {
        let table = usize::try_from(msg.table_id)
            .ok()
            .and_then(|id| self.tables.get_mut(id))
            .ok_or_else(|| CodecError::UnknownStringTable {
                table: msg.table_id.to_string(),
            })?;
        let count = usize::try_from(msg.num_changed_entries).unwrap_or(0);
        table.apply_entries(&msg.string_data, count, limits)
    }

    /// Replaces entry contents from a full-state snapshot.
    ///
    /// Tables the snapshot names but that were never created are skipped.
    pub fn apply_snapshot(&mut self, snapshot: &CDemoStringTables) {
        for snap in &snapshot.tables {
            match self.by_name.get(&snap.table_name) {
                Some(&id) => self.tables[id].replace_from_snapshot(&snap.items),
                None => tracing::trace!(table = %snap.table_name, "snapshot for unknown table"),
            }
        }
    }

    /// Drops every table.
    pub fn clear(&mut self) {
        self.tables.clear();
        self.by_name.clear();
    }

    #[must_use]
    pub fn get(&self, id: usize) -> Option<&StringTable> {
        self.tables.get(id)
    }

    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<&StringTable> {
        self.by_name.get(name).and_then(|&id| self.tables.get(id))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StringTable> {
        self.tables.iter()
    }
}
