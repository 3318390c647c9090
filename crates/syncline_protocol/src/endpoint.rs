//! Sync endpoint identity.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of one participant in a synchronization relationship.
///
/// Every node (hub or spoke) carries a stable `EndpointId`; checkpoints
/// are keyed by (scope, endpoint) pairs on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EndpointId(Uuid);

impl EndpointId {
    /// Generates a fresh random endpoint identity.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// The nil identity, used as a placeholder in error responses.
    pub const fn nil() -> Self {
        Self(Uuid::nil())
    }

    /// Wraps an existing UUID.
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl std::fmt::Display for EndpointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
