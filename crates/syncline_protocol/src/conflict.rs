//! Conflict cases and deterministic resolution.

use crate::record::{ChangeRecord, RowOp};
use serde::{Deserialize, Serialize};

/// Policy for automatic conflict resolution.
///
/// The policy set is deliberately binary. There is no last-write-wins
/// arbitration by wall clock: clock skew across nodes would make the
/// outcome depend on which machine resolved the conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictPolicy {
    /// The session-initiating side (the spoke) always wins.
    ClientWins,
    /// The hub always wins.
    ServerWins,
}

impl ConflictPolicy {
    /// Converts to a numeric code.
    pub fn to_code(&self) -> u8 {
        match self {
            ConflictPolicy::ClientWins => 1,
            ConflictPolicy::ServerWins => 2,
        }
    }

    /// Converts from a numeric code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(ConflictPolicy::ClientWins),
            2 => Some(ConflictPolicy::ServerWins),
            _ => None,
        }
    }
}

/// The role a node plays in a synchronization relationship.
///
/// Sessions are always initiated by the spoke, so `ClientWins` favors
/// the spoke's change and `ServerWins` favors the hub's, regardless of
/// which node is evaluating the conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncRole {
    /// The hub (server) side.
    Hub,
    /// A spoke (client) side.
    Spoke,
}

/// The outcome of resolving a conflict on one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    /// The local change stands; the incoming record is not applied.
    /// The winning local state reaches the remote through the normal
    /// outgoing exchange, since a conflicting row is by definition
    /// pending locally.
    KeepLocal,
    /// The incoming record is applied over the local change.
    AcceptRemote,
}

impl ConflictPolicy {
    /// Returns the resolution this policy produces on a node with the
    /// given role.
    ///
    /// The mapping is pure: for a fixed (policy, role) every conflict on
    /// that node resolves the same way, which is what makes the two ends
    /// converge without exchanging resolutions.
    pub fn winner(&self, role: SyncRole) -> Resolution {
        match (self, role) {
            (ConflictPolicy::ClientWins, SyncRole::Spoke) => Resolution::KeepLocal,
            (ConflictPolicy::ClientWins, SyncRole::Hub) => Resolution::AcceptRemote,
            (ConflictPolicy::ServerWins, SyncRole::Spoke) => Resolution::AcceptRemote,
            (ConflictPolicy::ServerWins, SyncRole::Hub) => Resolution::KeepLocal,
        }
    }
}

/// A pairing of a local and a remote change that target the same row
/// within one sync session.
///
/// Conflict cases are created during apply, resolved synchronously, and
/// not persisted beyond the session's audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictCase {
    /// The locally pending change.
    pub local: ChangeRecord,
    /// The incoming remote change.
    pub remote: ChangeRecord,
    /// The resolution, once decided.
    pub resolution: Option<Resolution>,
}

impl ConflictCase {
    /// Creates an unresolved conflict case.
    pub fn new(local: ChangeRecord, remote: ChangeRecord) -> Self {
        Self {
            local,
            remote,
            resolution: None,
        }
    }

    /// Returns true for an update/update (or insert/insert) collision.
    pub fn is_update_conflict(&self) -> bool {
        self.local.op.has_payload() && self.remote.op.has_payload()
    }

    /// Returns true when exactly one side deleted the row.
    pub fn is_update_delete_conflict(&self) -> bool {
        self.local.op.has_payload() != self.remote.op.has_payload()
    }

    /// Returns true when the operation kinds have no direct precedence
    /// under a policy and the generic rule decides.
    ///
    /// A delete paired with a non-delete is the only such combination;
    /// it is resolved by treating the delete as a row state like any
    /// other and falling back to the policy's named side.
    pub fn requires_escalation(&self) -> bool {
        self.is_update_delete_conflict()
    }

    /// Resolves the conflict under the given policy and role.
    ///
    /// Resolution is deterministic: repeated calls with the same policy
    /// and role always pick the same winner, with no dependence on
    /// timestamps or iteration order.
    pub fn resolve(&mut self, policy: ConflictPolicy, role: SyncRole) -> Resolution {
        let resolution = policy.winner(role);
        self.resolution = Some(resolution);
        resolution
    }

    /// Returns true once a resolution has been recorded.
    pub fn is_resolved(&self) -> bool {
        self.resolution.is_some()
    }

    /// Returns the fully materialized winning record, once resolved.
    ///
    /// For `AcceptRemote` this is the record to apply locally; for
    /// `KeepLocal` it is the local state the remote must adopt.
    pub fn winner(&self) -> Option<&ChangeRecord> {
        match self.resolution? {
            Resolution::KeepLocal => Some(&self.local),
            Resolution::AcceptRemote => Some(&self.remote),
        }
    }

    /// Returns true if both sides deleted the row; there is nothing to
    /// apply either way.
    pub fn is_vacuous(&self) -> bool {
        self.local.op == RowOp::Delete && self.remote.op == RowOp::Delete
    }
}
