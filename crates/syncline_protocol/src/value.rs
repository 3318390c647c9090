//! Row values and primary keys.

use serde::{Deserialize, Serialize};

/// A scalar column value.
///
/// The value set is deliberately small: the engine moves rows between
/// stores, it does not interpret them. Ordering is total (variant order,
/// then value order) so that primary keys can serve as deterministic
/// tie-breaks when rows share a change version.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ScalarValue {
    /// A 64-bit signed integer.
    Integer(i64),
    /// A UTF-8 string.
    Text(String),
    /// An opaque byte string.
    Bytes(Vec<u8>),
}

impl ScalarValue {
    /// Returns the integer value, if this is an integer.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            ScalarValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the text value, if this is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ScalarValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the byte value, if this is a byte string.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            ScalarValue::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

impl From<i64> for ScalarValue {
    fn from(v: i64) -> Self {
        ScalarValue::Integer(v)
    }
}

impl From<&str> for ScalarValue {
    fn from(v: &str) -> Self {
        ScalarValue::Text(v.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(v: String) -> Self {
        ScalarValue::Text(v)
    }
}

impl From<Vec<u8>> for ScalarValue {
    fn from(v: Vec<u8>) -> Self {
        ScalarValue::Bytes(v)
    }
}

/// An ordered tuple of primary-key values identifying one row.
///
/// Keys compare component-wise, which gives change batches a stable
/// secondary sort after the row version.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowKey(Vec<ScalarValue>);

impl RowKey {
    /// Creates a key from its components.
    pub fn new(components: Vec<ScalarValue>) -> Self {
        Self(components)
    }

    /// Creates a single-component key.
    pub fn single(component: impl Into<ScalarValue>) -> Self {
        Self(vec![component.into()])
    }

    /// Returns the key components in order.
    pub fn components(&self) -> &[ScalarValue] {
        &self.0
    }

    /// Returns the number of key components.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the key has no components.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<ScalarValue>> for RowKey {
    fn from(components: Vec<ScalarValue>) -> Self {
        Self(components)
    }
}
