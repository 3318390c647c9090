//! Error taxonomy for sync sessions.

use std::time::Duration;
use syncline_core::CoreError;
use syncline_protocol::ProtocolError;
use thiserror::Error;

/// Result type for engine operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while driving a sync session.
///
/// Only the orchestrator makes retry decisions; everything below it
/// propagates errors upward unclassified.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The two ends disagree on the scope's table and column
    /// definitions. Fatal: the operator must re-provision; the session
    /// is never retried automatically.
    #[error("schema drift on scope {scope}: {detail}")]
    SchemaDrift {
        /// The scope whose definitions diverged.
        scope: String,
        /// Human-readable detail.
        detail: String,
    },

    /// The session baseline precedes the change-tracking retention
    /// floor. Normally handled inside the session by switching to the
    /// full-reinitialization path; surfaces only if that path fails
    /// too.
    #[error("change tracking unavailable for {table}: baseline {requested} precedes floor {floor}")]
    TrackingUnavailable {
        /// The table whose history is gone.
        table: String,
        /// The requested baseline.
        requested: u64,
        /// The retention floor.
        floor: u64,
    },

    /// A transient network or database failure. Retried at session
    /// granularity within the attempt budget.
    #[error("transient failure: {0}")]
    Transient(String),

    /// The per-attempt timeout elapsed. The in-flight transaction was
    /// rolled back or completed; nothing is half-applied.
    #[error("session attempt timed out after {0:?}")]
    Timeout(Duration),

    /// Two sessions raced to commit a checkpoint for the same pair.
    /// The loser retries its whole session against the new checkpoint.
    #[error("checkpoint race on {scope}: expected version {expected}, found {actual}")]
    CheckpointRace {
        /// The scope being committed.
        scope: String,
        /// The version this session expected.
        expected: u64,
        /// The version actually found.
        actual: u64,
    },

    /// The peer refused the session or a request within it.
    #[error("peer rejected the session: {0}")]
    Rejected(String),

    /// The scope is not provisioned on this node.
    #[error("scope {0} is not provisioned")]
    UnknownScope(String),

    /// A message failed to encode or decode.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The session was cancelled between batches.
    #[error("sync cancelled")]
    Cancelled,

    /// The retry budget was exhausted by transient failures.
    #[error("retry budget exhausted after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// How many attempts were made.
        attempts: u32,
        /// The last error observed.
        last: Box<SyncError>,
    },

    /// A store failure with no more specific classification.
    #[error("store error: {0}")]
    Store(CoreError),
}

impl SyncError {
    /// Returns true if a fresh session attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::Transient(_) | SyncError::Timeout(_) | SyncError::CheckpointRace { .. }
        )
    }

    /// Returns true for errors that require operator intervention and
    /// must never be retried automatically.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::SchemaDrift { .. })
    }
}

impl From<CoreError> for SyncError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::TrackingUnavailable {
                table,
                requested,
                floor,
            } => SyncError::TrackingUnavailable {
                table,
                requested,
                floor,
            },
            CoreError::CheckpointRace {
                scope,
                expected,
                actual,
            } => SyncError::CheckpointRace {
                scope,
                expected,
                actual,
            },
            CoreError::Storage(message) => SyncError::Transient(message),
            CoreError::UnknownScope(scope) => SyncError::UnknownScope(scope),
            other => SyncError::Store(other),
        }
    }
}

impl From<ProtocolError> for SyncError {
    fn from(err: ProtocolError) -> Self {
        SyncError::Protocol(err.to_string())
    }
}
