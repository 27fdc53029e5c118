//! Decoded field values.

use std::fmt;

/// A decoded property value.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum FieldValue {
    Bool(bool),
    Signed(i64),
    Unsigned(u64),
    Float(f32),
    String(String),
    Vector2([f32; 2]),
    Vector3([f32; 3]),
    Vector4([f32; 4]),
}

impl FieldValue {
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns integer values as `i64`, whichever signedness they decoded with.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Signed(v) => Some(*v),
            Self::Unsigned(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Unsigned(v) => Some(*v),
            Self::Signed(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_f32(&self) -> Option<f32> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    /// Returns vector components, for any vector width.
    #[must_use]
    pub fn as_slice(&self) -> Option<&[f32]> {
        match self {
            Self::Vector2(v) => Some(v),
            Self::Vector3(v) => Some(v),
            Self::Vector4(v) => Some(v),
            _ => None,
        }
    }

    /// Interprets the value as an entity handle.
    #[must_use]
    pub fn as_handle(&self) -> Option<u32> {
        self.as_u64().and_then(|v| u32::try_from(v).ok())
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Signed(v) => write!(f, "{v}"),
            Self::Unsigned(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "{v:?}"),
            Self::Vector2([x, y]) => write!(f, "[{x}, {y}]"),
            Self::Vector3([x, y, z]) => write!(f, "[{x}, {y}, {z}]"),
            Self::Vector4([x, y, z, w]) => write!(f, "[{x}, {y}, {z}, {w}]"),
        }
    }
}
