//! Error types for store and sync-primitive operations.

use syncline_protocol::ProtocolError;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in the store layer and sync primitives.
#[derive(Error, Debug)]
pub enum CoreError {
    /// The requested baseline precedes the change-tracking retention
    /// floor, or tracking is disabled for the table. History needed to
    /// compute the delta is gone; the caller must fall back to full
    /// reinitialization.
    #[error("change tracking unavailable for {table}: requested baseline {requested} precedes retention floor {floor}")]
    TrackingUnavailable {
        /// The table whose history is unavailable.
        table: String,
        /// The requested baseline version.
        requested: u64,
        /// The current retention floor.
        floor: u64,
    },

    /// The named scope has not been provisioned.
    #[error("unknown scope: {0}")]
    UnknownScope(String),

    /// The named table is not tracked.
    #[error("unknown table: {0}")]
    UnknownTable(String),

    /// A scope with this name is already provisioned.
    #[error("scope already provisioned: {0}")]
    ScopeExists(String),

    /// A re-provision was attempted with a different setup hash.
    /// The scope must be explicitly deprovisioned first.
    #[error("setup hash mismatch for scope {scope}; deprovision before re-provisioning")]
    SetupHashMismatch {
        /// The scope whose definitions drifted.
        scope: String,
    },

    /// Two sessions raced to commit a checkpoint for the same
    /// (scope, endpoint) pair. The loser retries its whole session
    /// against the new checkpoint.
    #[error("checkpoint race on {scope}: expected version {expected}, found {actual}")]
    CheckpointRace {
        /// The scope being committed.
        scope: String,
        /// The version the committer expected to replace.
        expected: u64,
        /// The version actually found.
        actual: u64,
    },

    /// Protocol encoding failed.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// An underlying storage failure. Used by fault-injecting test
    /// stores and by adapters over fallible backends.
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<ProtocolError> for CoreError {
    fn from(err: ProtocolError) -> Self {
        CoreError::Encoding(err.to_string())
    }
}

impl CoreError {
    /// Returns true for failures that a fresh session attempt may clear.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CoreError::Storage(_) | CoreError::CheckpointRace { .. }
        )
    }
}
