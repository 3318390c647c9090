//! Row-level change records and change batches.

use crate::value::{RowKey, ScalarValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The kind of a row-level change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RowOp {
    /// The row was created.
    Insert,
    /// The row was modified.
    Update,
    /// The row was removed. Delete records carry no payload.
    Delete,
}

impl RowOp {
    /// Converts to a numeric code for compact logging and diagnostics.
    pub fn to_code(&self) -> u8 {
        match self {
            RowOp::Insert => 1,
            RowOp::Update => 2,
            RowOp::Delete => 3,
        }
    }

    /// Converts from a numeric code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(RowOp::Insert),
            2 => Some(RowOp::Update),
            3 => Some(RowOp::Delete),
            _ => None,
        }
    }

    /// Returns true for operations that carry a payload.
    pub fn has_payload(&self) -> bool {
        !matches!(self, RowOp::Delete)
    }
}

/// One row-level change.
///
/// A `ChangeRecord` is constructed by the batch builder for a single
/// session and discarded after application; it is never persisted beyond
/// the transport payload.
///
/// # Fields
///
/// - `table`: the table the row belongs to
/// - `key`: ordered primary-key values
/// - `op`: insert, update, or delete
/// - `version`: the change-tracking version at which the row last changed
/// - `payload`: column values by column name (empty for deletes)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Table identifier.
    pub table: String,
    /// Primary-key values.
    pub key: RowKey,
    /// Operation kind.
    pub op: RowOp,
    /// Row version assigned by the originating node's change tracking.
    pub version: u64,
    /// Column values. Empty for deletes.
    pub payload: BTreeMap<String, ScalarValue>,
}

impl ChangeRecord {
    /// Creates an insert record.
    pub fn insert(
        table: impl Into<String>,
        key: RowKey,
        version: u64,
        payload: BTreeMap<String, ScalarValue>,
    ) -> Self {
        Self {
            table: table.into(),
            key,
            op: RowOp::Insert,
            version,
            payload,
        }
    }

    /// Creates an update record.
    pub fn update(
        table: impl Into<String>,
        key: RowKey,
        version: u64,
        payload: BTreeMap<String, ScalarValue>,
    ) -> Self {
        Self {
            table: table.into(),
            key,
            op: RowOp::Update,
            version,
            payload,
        }
    }

    /// Creates a delete record.
    pub fn delete(table: impl Into<String>, key: RowKey, version: u64) -> Self {
        Self {
            table: table.into(),
            key,
            op: RowOp::Delete,
            version,
            payload: BTreeMap::new(),
        }
    }

    /// Returns the number of column values carried by this record.
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }
}

/// A bounded, ordered chunk of change records transmitted as one unit.
///
/// Batches are produced by the batch builder, applied in a single
/// transaction, and discarded. The final batch of a direction is flagged
/// `is_last`; a direction with no changes still produces one empty batch
/// flagged `is_last` so the wire protocol stays symmetric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    /// The scope this batch belongs to.
    pub scope: String,
    /// Batch sequence number within the session, starting at 1.
    pub sequence: u64,
    /// Change records in application order.
    pub records: Vec<ChangeRecord>,
    /// True if this is the final batch in its direction.
    pub is_last: bool,
}

impl Batch {
    /// Creates a new batch.
    pub fn new(scope: impl Into<String>, sequence: u64, records: Vec<ChangeRecord>) -> Self {
        Self {
            scope: scope.into(),
            sequence,
            records,
            is_last: false,
        }
    }

    /// Creates the final batch in a direction.
    pub fn last(scope: impl Into<String>, sequence: u64, records: Vec<ChangeRecord>) -> Self {
        Self {
            scope: scope.into(),
            sequence,
            records,
            is_last: true,
        }
    }

    /// Creates an empty final batch (the zero-changes case).
    pub fn empty_last(scope: impl Into<String>, sequence: u64) -> Self {
        Self::last(scope, sequence, Vec::new())
    }

    /// Returns the number of records in the batch.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if the batch carries no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns the highest row version in the batch, if any.
    pub fn max_version(&self) -> Option<u64> {
        self.records.iter().map(|r| r.version).max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(pairs: &[(&str, i64)]) -> BTreeMap<String, ScalarValue> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), ScalarValue::Integer(*v)))
            .collect()
    }

    #[test]
    fn row_op_codes() {
        assert_eq!(RowOp::Insert.to_code(), 1);
        assert_eq!(RowOp::Update.to_code(), 2);
        assert_eq!(RowOp::Delete.to_code(), 3);

        assert_eq!(RowOp::from_code(1), Some(RowOp::Insert));
        assert_eq!(RowOp::from_code(3), Some(RowOp::Delete));
        assert_eq!(RowOp::from_code(0), None);
    }

    #[test]
    fn delete_has_no_payload() {
        let record = ChangeRecord::delete("orders", RowKey::single(9i64), 40);
        assert!(!record.op.has_payload());
        assert_eq!(record.payload_len(), 0);
    }

    #[test]
    fn record_roundtrip() {
        let record = ChangeRecord::update(
            "orders",
            RowKey::single(9i64),
            41,
            payload(&[("qty", 3), ("total", 120)]),
        );

        let bytes = crate::wire::encode(&record).unwrap();
        let decoded: ChangeRecord = crate::wire::decode(&bytes).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn batch_flags_and_bounds() {
        let records = vec![
            ChangeRecord::insert("orders", RowKey::single(1i64), 11, payload(&[("qty", 1)])),
            ChangeRecord::insert("orders", RowKey::single(2i64), 12, payload(&[("qty", 2)])),
        ];

        let batch = Batch::new("sales", 1, records);
        assert_eq!(batch.len(), 2);
        assert!(!batch.is_last);
        assert_eq!(batch.max_version(), Some(12));

        let last = Batch::empty_last("sales", 2);
        assert!(last.is_last);
        assert!(last.is_empty());
        assert_eq!(last.max_version(), None);
    }
}
