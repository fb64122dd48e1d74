//! Core value types for KeelDB storage and queries.

use serde::{Deserialize, Serialize};

/// Identifier of a fixed-size block within a store file.
///
/// Block 0 is reserved for the store header. `INVALID` is the on-disk
/// sentinel for "no block" (root pointer of an empty store, end of the
/// free-list chain).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockId(pub u32);

impl BlockId {
    /// Sentinel for "no block".
    pub const INVALID: BlockId = BlockId(u32::MAX);

    /// Returns true if this id refers to an actual block.
    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_valid() {
            write!(f, "{}", self.0)
        } else {
            write!(f, "-")
        }
    }
}

/// Handle into record storage.
///
/// Wraps a non-negative integer; `EMPTY` (negative) denotes absence so the
/// present/absent distinction survives serialization without an `Option`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(i64);

impl RecordId {
    /// Sentinel denoting "no record".
    pub const EMPTY: RecordId = RecordId(-1);

    /// Creates a record id from a non-negative integer.
    pub fn new(id: i64) -> Self {
        debug_assert!(id >= 0, "record ids are non-negative");
        Self(id)
    }

    /// Returns the raw integer value (negative for `EMPTY`).
    pub fn raw(&self) -> i64 {
        self.0
    }

    /// Returns true if this is the absence sentinel.
    pub fn is_empty(&self) -> bool {
        self.0 < 0
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            write!(f, "EMPTY")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// A typed field value, the closed set of key domains the core indexes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    /// 64-bit signed integer.
    Int(i64),
    /// UTF-8 string.
    Str(String),
}

impl FieldValue {
    /// Name of the value's type, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Int(_) => "int",
            FieldValue::Str(_) => "string",
        }
    }

    /// Compares two values of the same type.
    ///
    /// Returns `None` when the types differ; callers surface that as a
    /// predicate type mismatch.
    pub fn try_cmp(&self, other: &FieldValue) -> Option<std::cmp::Ordering> {
        match (self, other) {
            (FieldValue::Int(a), FieldValue::Int(b)) => Some(a.cmp(b)),
            (FieldValue::Str(a), FieldValue::Str(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Int(v) => write!(f, "{v}"),
            FieldValue::Str(v) => write!(f, "'{v}'"),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Str(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Str(v)
    }
}
