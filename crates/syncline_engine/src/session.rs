//! Session states, summaries, and engine statistics.

use std::time::Duration;
use syncline_protocol::EndpointId;

/// The state of a sync session.
///
/// Sessions move through the states in order, looping between
/// `ExchangingBatches`, `ApplyingChanges`, and `ResolvingConflicts`
/// until both directions are drained. `Faulted` is terminal for the
/// session: the checkpoint is not advanced and the next session retries
/// from the old one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No session in progress.
    Idle,
    /// Validating scope identity and setup hashes with the peer.
    NegotiatingScope,
    /// Fetching each side's checkpoint.
    PullingBaseline,
    /// Sending and receiving batches.
    ExchangingBatches,
    /// Applying an incoming batch inside one transaction.
    ApplyingChanges,
    /// Resolving conflicts found in the current batch.
    ResolvingConflicts,
    /// Persisting the new checkpoint.
    CommittingCheckpoint,
    /// The session aborted; the checkpoint was not advanced.
    Faulted,
}

impl SessionState {
    /// Returns true while a session is actively exchanging or applying.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SessionState::NegotiatingScope
                | SessionState::PullingBaseline
                | SessionState::ExchangingBatches
                | SessionState::ApplyingChanges
                | SessionState::ResolvingConflicts
                | SessionState::CommittingCheckpoint
        )
    }

    /// Returns true if a new session may start from this state.
    pub fn can_start(&self) -> bool {
        matches!(self, SessionState::Idle | SessionState::Faulted)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::NegotiatingScope => "negotiating-scope",
            SessionState::PullingBaseline => "pulling-baseline",
            SessionState::ExchangingBatches => "exchanging-batches",
            SessionState::ApplyingChanges => "applying-changes",
            SessionState::ResolvingConflicts => "resolving-conflicts",
            SessionState::CommittingCheckpoint => "committing-checkpoint",
            SessionState::Faulted => "faulted",
        };
        f.write_str(name)
    }
}

/// The result of one completed session.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    /// The scope synchronized.
    pub scope: String,
    /// The hub endpoint the session ran against.
    pub hub: EndpointId,
    /// Rows sent to the hub.
    pub pushed_rows: u64,
    /// Rows applied from the hub.
    pub pulled_rows: u64,
    /// Batches sent.
    pub batches_sent: u64,
    /// Batches received.
    pub batches_received: u64,
    /// Conflicts resolved on this node.
    pub conflicts_local: u64,
    /// Conflicts the hub reported resolving.
    pub conflicts_remote: u64,
    /// Attempts used, including the successful one.
    pub attempts: u32,
    /// True if the session fell back to full reinitialization.
    pub reinitialized: bool,
    /// Wall-clock duration of the successful attempt.
    pub duration: Duration,
    /// The checkpoint version committed.
    pub checkpoint_version: u64,
}

impl SessionSummary {
    pub(crate) fn new(scope: &str, hub: EndpointId) -> Self {
        Self {
            scope: scope.to_string(),
            hub,
            pushed_rows: 0,
            pulled_rows: 0,
            batches_sent: 0,
            batches_received: 0,
            conflicts_local: 0,
            conflicts_remote: 0,
            attempts: 1,
            reinitialized: false,
            duration: Duration::ZERO,
            checkpoint_version: 0,
        }
    }

    /// Total conflicts observed across both ends.
    pub fn total_conflicts(&self) -> u64 {
        self.conflicts_local + self.conflicts_remote
    }
}

/// Cumulative statistics across an orchestrator's lifetime.
#[derive(Debug, Clone, Default)]
pub struct EngineStats {
    /// Sessions that reached checkpoint commit.
    pub sessions_completed: u64,
    /// Sessions that faulted.
    pub sessions_faulted: u64,
    /// Session retries performed.
    pub retries: u64,
    /// Total rows pushed.
    pub rows_pushed: u64,
    /// Total rows pulled.
    pub rows_pulled: u64,
    /// Total conflicts resolved locally.
    pub conflicts_resolved: u64,
    /// The last error observed, if any.
    pub last_error: Option<String>,
}
