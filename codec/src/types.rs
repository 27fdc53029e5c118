//! Core identifier types.

use std::fmt;

/// Bits of a handle holding the entity index.
pub const INDEX_BITS: u32 = 14;

const INDEX_MASK: u32 = (1 << INDEX_BITS) - 1;

/// Generation-aware entity identity: `serial << 14 | index`.
///
/// A recycled index gets a new serial, so handles to the old occupant stop
/// resolving instead of silently pointing at the new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EntityHandle(u32);

impl EntityHandle {
    #[must_use]
    pub const fn new(index: u32, serial: u32) -> Self {
        Self(serial << INDEX_BITS | (index & INDEX_MASK))
    }

    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn index(self) -> u32 {
        self.0 & INDEX_MASK
    }

    #[must_use]
    pub const fn serial(self) -> u32 {
        self.0 >> INDEX_BITS
    }
}

impl From<u32> for EntityHandle {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl From<EntityHandle> for u32 {
    fn from(handle: EntityHandle) -> Self {
        handle.0
    }
}

impl fmt::Display for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.index(), self.serial())
    }
}

/// The span of packets from one full packet up to the next.
///
/// Partition 0 is everything before the first full packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PartitionId(u32);

impl PartitionId {
    pub const SIGNON: Self = Self(0);

    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    #[must_use]
    pub const fn is_signon(self) -> bool {
        self.0 == 0
    }
}

impl From<u32> for PartitionId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}
