//! Store contracts consumed by the engine and the hub.

use crate::error::CoreResult;
use std::collections::BTreeMap;
use std::time::{Duration, SystemTime};
use syncline_protocol::{ChangeRecord, EndpointId, RowKey, ScalarValue, ScopeDef, SetupHash};

/// Reads per-table change metadata from the underlying store.
///
/// The change-tracking primitive itself (monotonic version counters per
/// changed row) belongs to the store; this contract only consumes it.
/// Version retention cleanup is likewise the store's own business,
/// observed here through [`CoreError::TrackingUnavailable`] and never
/// driven.
///
/// [`CoreError::TrackingUnavailable`]: crate::CoreError::TrackingUnavailable
pub trait VersionStore: Send + Sync {
    /// Returns the store's current change-tracking version for a scope.
    fn current_version(&self, scope: &str) -> CoreResult<u64>;

    /// Returns the changes in `table` with version greater than
    /// `since_version`, destined for `for_endpoint`.
    ///
    /// Changes that `for_endpoint` itself originated are excluded so
    /// applied rows do not echo back to their sender. Results are
    /// ordered by row version ascending, then primary key ascending
    /// (a deterministic tie-break for reproducibility).
    ///
    /// Fails with `TrackingUnavailable` when `since_version` precedes
    /// the retention floor or tracking is disabled for the table.
    fn changes_since(
        &self,
        scope: &str,
        table: &str,
        since_version: u64,
        for_endpoint: &EndpointId,
    ) -> CoreResult<Vec<ChangeRecord>>;

    /// Returns every live row of `table` as an insert record at its
    /// current version, ordered like `changes_since`.
    ///
    /// This is the full-reinitialization path: when tracked history is
    /// gone, both ends re-seed from live rows instead of deltas.
    fn snapshot(&self, scope: &str, table: &str) -> CoreResult<Vec<ChangeRecord>>;

    /// Records that versions up to `version` have been exchanged for
    /// the scope. This is an observation used for diagnostics and
    /// retention reasoning; it has no side effect on tracking itself.
    fn mark_applied(&self, scope: &str, version: u64) -> CoreResult<()>;

    /// Returns the watermark last recorded by [`mark_applied`].
    ///
    /// [`mark_applied`]: VersionStore::mark_applied
    fn applied_watermark(&self, scope: &str) -> CoreResult<u64>;
}

/// Applies change batches and answers row-level lookups.
pub trait ApplyStore: Send + Sync {
    /// Applies the records atomically: either every record commits or
    /// none do.
    ///
    /// Inserts and updates are upserts and deletes of absent rows are
    /// skipped, so re-applying a batch after an aborted session is
    /// harmless. Each written row is stamped with a fresh local
    /// version attributed to `origin`.
    fn apply(
        &self,
        scope: &str,
        origin: &EndpointId,
        records: &[ChangeRecord],
    ) -> CoreResult<ApplyReceipt>;

    /// Returns change metadata for a row, including tombstones.
    fn row_meta(&self, table: &str, key: &RowKey) -> CoreResult<Option<RowMeta>>;

    /// Returns a live row's payload and version. Tombstones read as
    /// `None`.
    fn read_row(
        &self,
        table: &str,
        key: &RowKey,
    ) -> CoreResult<Option<(BTreeMap<String, ScalarValue>, u64)>>;
}

/// Owns the persisted sync metadata: scope records and checkpoints.
///
/// Both tables are authoritative system-of-record for resuming sessions
/// after a process restart.
pub trait SchemaStore: Send + Sync {
    /// Creates the scope record and tracking structures for a scope.
    ///
    /// Fails with `ScopeExists` if the scope is already provisioned.
    fn create_scope(&self, def: &ScopeDef, setup_hash: SetupHash) -> CoreResult<()>;

    /// Returns the scope record, if provisioned.
    fn scope_meta(&self, scope: &str) -> CoreResult<Option<ScopeMeta>>;

    /// Tears down the scope record, its checkpoints, and its tracking
    /// structures. Dropping an absent scope is a no-op.
    fn drop_scope(&self, scope: &str) -> CoreResult<()>;

    /// Returns the checkpoint for a (scope, endpoint) pair, if any.
    fn checkpoint(&self, scope: &str, endpoint: &EndpointId) -> CoreResult<Option<Checkpoint>>;

    /// Replaces the checkpoint for a pair, compare-and-swap style.
    ///
    /// `expected` is the version the caller last read (`None` for "no
    /// checkpoint yet"). A mismatch fails with `CheckpointRace` and
    /// leaves the stored checkpoint untouched.
    fn commit_checkpoint(
        &self,
        scope: &str,
        endpoint: &EndpointId,
        expected: Option<u64>,
        checkpoint: Checkpoint,
    ) -> CoreResult<()>;
}

/// The full store contract a sync node needs.
pub trait SyncStore: VersionStore + ApplyStore + SchemaStore {}

impl<T: VersionStore + ApplyStore + SchemaStore> SyncStore for T {}

/// The provisioned record of a scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeMeta {
    /// The scope definition as provisioned.
    pub def: ScopeDef,
    /// Fingerprint of the table and column definitions.
    pub setup_hash: SetupHash,
}

/// The last successfully exchanged version for a (scope, endpoint) pair.
///
/// Owned exclusively by the scope registry; read at the start of every
/// session and replaced at the end of every successful one.
#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    /// The version watermark delivered to the endpoint.
    pub last_sync_version: u64,
    /// When the session committed.
    pub last_sync_at: SystemTime,
    /// How long the session took.
    pub last_sync_duration: Duration,
}

impl Checkpoint {
    /// Creates a checkpoint stamped with the current time.
    pub fn new(last_sync_version: u64, last_sync_duration: Duration) -> Self {
        Self {
            last_sync_version,
            last_sync_at: SystemTime::now(),
            last_sync_duration,
        }
    }
}

/// Change metadata for one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowMeta {
    /// The version of the row's latest change.
    pub version: u64,
    /// The endpoint the latest change was applied from, or `None` for
    /// a local write.
    pub origin: Option<EndpointId>,
    /// True if the latest change was a delete (the row is a tombstone).
    pub deleted: bool,
}

impl RowMeta {
    /// Returns true if the latest change was made locally (not applied
    /// from a peer).
    pub fn is_local_change(&self) -> bool {
        self.origin.is_none()
    }
}

/// The outcome of an atomic batch application.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReceipt {
    /// Rows written, including tombstones.
    pub applied: u64,
    /// Records skipped (deletes of rows that were already gone).
    pub skipped: u64,
    /// First local version stamped by this application, when any.
    pub first_version: Option<u64>,
    /// Last local version stamped by this application, when any.
    pub last_version: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkpoint_carries_duration() {
        let checkpoint = Checkpoint::new(42, Duration::from_millis(1800));
        assert_eq!(checkpoint.last_sync_version, 42);
        assert_eq!(checkpoint.last_sync_duration, Duration::from_millis(1800));
    }

    #[test]
    fn row_meta_locality() {
        let local = RowMeta {
            version: 3,
            origin: None,
            deleted: false,
        };
        let applied = RowMeta {
            version: 4,
            origin: Some(EndpointId::generate()),
            deleted: false,
        };

        assert!(local.is_local_change());
        assert!(!applied.is_local_change());
    }
}
