//! Interned field paths and their transfer codes.
//!
//! A [`FieldPath`] is a `Copy` handle to a process-wide, append-only table of
//! index sequences. Two paths with the same elements are the same handle, so
//! equality and hashing never look at the elements. Entries are never freed;
//! the number of distinct paths in a demo is bounded by its schema.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{OnceLock, PoisonError, RwLock};

use crate::error::{SchemaError, SchemaResult};

/// Maximum number of elements in a field path.
pub const MAX_FIELD_PATH_DEPTH: usize = 7;

const WIDE_FLAG: u32 = 1 << 31;
const PAIR_FLAG: u32 = 1 << 30;
const PAIR_ELEMENT_BITS: u32 = 15;
const PAIR_ELEMENT_MASK: u32 = (1 << PAIR_ELEMENT_BITS) - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PathKey {
    len: u8,
    elements: [u16; MAX_FIELD_PATH_DEPTH],
}

impl PathKey {
    fn new(elements: &[u16]) -> SchemaResult<Self> {
        if elements.len() > MAX_FIELD_PATH_DEPTH {
            return Err(SchemaError::FieldPathTooDeep {
                depth: MAX_FIELD_PATH_DEPTH,
            });
        }
        let mut key = Self {
            len: elements.len() as u8,
            elements: [0; MAX_FIELD_PATH_DEPTH],
        };
        key.elements[..elements.len()].copy_from_slice(elements);
        Ok(key)
    }
}

#[derive(Debug)]
struct FieldPathData {
    id: u32,
    key: PathKey,
}

/// An interned sequence of field indices.
#[derive(Clone, Copy)]
pub struct FieldPath(&'static FieldPathData);

#[derive(Default)]
struct Interner {
    by_key: HashMap<PathKey, FieldPath>,
    by_id: Vec<FieldPath>,
}

static INTERNER: OnceLock<RwLock<Interner>> = OnceLock::new();

thread_local! {
    static LOCAL: RefCell<HashMap<PathKey, FieldPath>> = RefCell::new(HashMap::new());
}

fn interner() -> &'static RwLock<Interner> {
    INTERNER.get_or_init(|| RwLock::new(Interner::default()))
}

fn intern_global(key: PathKey) -> FieldPath {
    {
        let table = interner().read().unwrap_or_else(PoisonError::into_inner);
        if let Some(path) = table.by_key.get(&key) {
            return *path;
        }
    }
    let mut table = interner().write().unwrap_or_else(PoisonError::into_inner);
    let Interner { by_key, by_id } = &mut *table;
    *by_key.entry(key).or_insert_with(|| {
        let data: &'static FieldPathData = Box::leak(Box::new(FieldPathData {
            id: by_id.len() as u32,
            key,
        }));
        let path = FieldPath(data);
        by_id.push(path);
        path
    })
}

fn intern(key: PathKey) -> FieldPath {
    LOCAL.with(|local| {
        if let Some(path) = local.borrow().get(&key).copied() {
            return path;
        }
        let path = intern_global(key);
        local.borrow_mut().insert(key, path);
        path
    })
}

impl FieldPath {
    /// Interns `elements`, returning the shared handle for that sequence.
    pub fn new(elements: &[u16]) -> SchemaResult<Self> {
        PathKey::new(elements).map(intern)
    }

    /// Returns the path elements.
    #[must_use]
    pub fn elements(&self) -> &'static [u16] {
        let data = self.0;
        &data.key.elements[..data.key.len as usize]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.key.len as usize
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the element at `position`.
    #[must_use]
    pub fn get(&self, position: usize) -> Option<usize> {
        self.elements().get(position).map(|e| usize::from(*e))
    }

    /// Position of the last element.
    #[must_use]
    pub fn last_position(&self) -> usize {
        self.len().saturating_sub(1)
    }

    /// Compact numeric form for moving paths across threads.
    ///
    /// One element fits in the low 30 bits, two elements below 2^15 each
    /// pack into 15 + 15 bits with bit 30 set, and anything else is the
    /// interner id with bit 31 set. Interner ids are only meaningful inside
    /// the process that produced them.
    #[must_use]
    pub fn transfer_code(&self) -> u32 {
        let elements = self.elements();
        match *elements {
            [single] => u32::from(single),
            [first, second]
                if u32::from(first) <= PAIR_ELEMENT_MASK && u32::from(second) <= PAIR_ELEMENT_MASK =>
            {
                PAIR_FLAG | (u32::from(first) << PAIR_ELEMENT_BITS) | u32::from(second)
            }
            _ => WIDE_FLAG | self.0.id,
        }
    }

    /// Reverses [`transfer_code`](Self::transfer_code).
    pub fn from_transfer_code(code: u32) -> SchemaResult<Self> {
        if code & WIDE_FLAG != 0 {
            let id = (code & !WIDE_FLAG) as usize;
            let table = interner().read().unwrap_or_else(PoisonError::into_inner);
            return table
                .by_id
                .get(id)
                .copied()
                .ok_or(SchemaError::InvalidTransferCode { code });
        }
        if code & PAIR_FLAG != 0 {
            let first = (code >> PAIR_ELEMENT_BITS) & PAIR_ELEMENT_MASK;
            let second = code & PAIR_ELEMENT_MASK;
            return Self::new(&[first as u16, second as u16]);
        }
        let single =
            u16::try_from(code).map_err(|_| SchemaError::InvalidTransferCode { code })?;
        Self::new(&[single])
    }
}

/// Number of distinct paths interned so far in this process.
#[must_use]
pub fn interned_count() -> usize {
    interner()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .by_id
        .len()
}

impl PartialEq for FieldPath {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.0, other.0)
    }
}

impl Eq for FieldPath {}

impl Hash for FieldPath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl Ord for FieldPath {
    fn cmp(&self, other: &Self) -> Ordering {
        self.elements().cmp(other.elements())
    }
}

impl PartialOrd for FieldPath {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, element) in self.elements().iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            write!(f, "{element}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FieldPath({self})")
    }
}

/// The mutable working path driven by field-path operations.
///
/// Elements are signed while building: a fresh builder starts at `[-1]` so
/// the first `+1` lands on index zero.
#[derive(Debug, Clone)]
pub(crate) struct FieldPathBuilder {
    path: [i32; MAX_FIELD_PATH_DEPTH],
    last: usize,
}

impl FieldPathBuilder {
    pub(crate) const fn new() -> Self {
        let mut path = [0; MAX_FIELD_PATH_DEPTH];
        path[0] = -1;
        Self { path, last: 0 }
    }

    pub(crate) const fn last(&self) -> usize {
        self.last
    }

    pub(crate) fn add(&mut self, position: usize, delta: i32) {
        self.path[position] = self.path[position].wrapping_add(delta);
    }

    pub(crate) fn add_last(&mut self, delta: i32) {
        self.add(self.last, delta);
    }

    /// Opens a new level and adds `value` to it.
    pub(crate) fn push(&mut self, value: i32) -> SchemaResult<()> {
        if self.last + 1 >= MAX_FIELD_PATH_DEPTH {
            return Err(SchemaError::FieldPathTooDeep {
                depth: MAX_FIELD_PATH_DEPTH,
            });
        }
        self.last += 1;
        self.add_last(value);
        Ok(())
    }

    /// Closes `count` levels, zeroing them.
    pub(crate) fn pop(&mut self, count: usize, op: &'static str) -> SchemaResult<()> {
        if count > self.last {
            return Err(SchemaError::FieldPathUnderflow { op });
        }
        for _ in 0..count {
            self.path[self.last] = 0;
            self.last -= 1;
        }
        Ok(())
    }

    /// Interns the current path.
    pub(crate) fn build(&self) -> SchemaResult<FieldPath> {
        let mut key = PathKey {
            len: (self.last + 1) as u8,
            elements: [0; MAX_FIELD_PATH_DEPTH],
        };
        for (position, value) in self.path[..=self.last].iter().enumerate() {
            key.elements[position] =
                u16::try_from(*value).map_err(|_| SchemaError::InvalidFieldPathElement {
                    position,
                    value: *value,
                })?;
        }
        Ok(intern(key))
    }
}
