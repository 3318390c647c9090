//! Protocol messages for sync sessions.

use crate::endpoint::EndpointId;
use crate::error::ProtocolResult;
use crate::record::Batch;
use crate::schema::SetupHash;
use serde::{Deserialize, Serialize};

/// The protocol version spoken by this crate.
pub const PROTOCOL_VERSION: u16 = 1;

/// Endpoint path for negotiation frames.
pub const NEGOTIATE_PATH: &str = "/sync/negotiate";
/// Endpoint path for exchange frames.
pub const EXCHANGE_PATH: &str = "/sync/exchange";
/// Endpoint path for commit frames.
pub const COMMIT_PATH: &str = "/sync/commit";

/// A sync protocol message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SyncMessage {
    /// Scope negotiation request.
    NegotiateRequest(NegotiateRequest),
    /// Scope negotiation response.
    NegotiateResponse(NegotiateResponse),
    /// Batch exchange request.
    ExchangeRequest(ExchangeRequest),
    /// Batch exchange response.
    ExchangeResponse(ExchangeResponse),
    /// Checkpoint commit request.
    CommitRequest(CommitRequest),
    /// Checkpoint commit response.
    CommitResponse(CommitResponse),
}

impl SyncMessage {
    /// Returns the message type code.
    pub fn type_code(&self) -> u8 {
        match self {
            SyncMessage::NegotiateRequest(_) => 1,
            SyncMessage::NegotiateResponse(_) => 2,
            SyncMessage::ExchangeRequest(_) => 3,
            SyncMessage::ExchangeResponse(_) => 4,
            SyncMessage::CommitRequest(_) => 5,
            SyncMessage::CommitResponse(_) => 6,
        }
    }

    /// Encodes the message to CBOR.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        crate::wire::encode(self)
    }

    /// Decodes a message from CBOR.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        crate::wire::decode(bytes)
    }
}

/// Opens a session: the spoke announces its identity, scope, and schema
/// fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegotiateRequest {
    /// Scope to synchronize.
    pub scope: String,
    /// The spoke's endpoint identity.
    pub endpoint: EndpointId,
    /// The spoke's setup hash for the scope.
    pub setup_hash: SetupHash,
    /// Protocol version.
    pub protocol_version: u16,
    /// The spoke's last committed checkpoint version, for diagnostics.
    pub last_sync_version: u64,
}

impl NegotiateRequest {
    /// Creates a negotiation request.
    pub fn new(
        scope: impl Into<String>,
        endpoint: EndpointId,
        setup_hash: SetupHash,
        last_sync_version: u64,
    ) -> Self {
        Self {
            scope: scope.into(),
            endpoint,
            setup_hash,
            protocol_version: PROTOCOL_VERSION,
            last_sync_version,
        }
    }
}

/// The hub's answer to a negotiation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegotiateResponse {
    /// Whether the session may proceed.
    pub accepted: bool,
    /// The hub's endpoint identity. Spokes key their checkpoints by it.
    pub hub_endpoint: EndpointId,
    /// The hub's setup hash for the scope. Both ends compare hashes, so
    /// a rejected spoke can tell schema drift apart from other refusals.
    pub hub_setup_hash: SetupHash,
    /// The hub's checkpoint for this (scope, endpoint) pair.
    pub hub_checkpoint: u64,
    /// The hub's current change-tracking version.
    pub hub_current_version: u64,
    /// Error message when rejected.
    pub error: Option<String>,
}

impl NegotiateResponse {
    /// Creates an accepting response.
    pub fn accepted(
        hub_endpoint: EndpointId,
        hub_setup_hash: SetupHash,
        hub_checkpoint: u64,
        hub_current_version: u64,
    ) -> Self {
        Self {
            accepted: true,
            hub_endpoint,
            hub_setup_hash,
            hub_checkpoint,
            hub_current_version,
            error: None,
        }
    }

    /// Creates a rejecting response.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            accepted: false,
            hub_endpoint: EndpointId::nil(),
            hub_setup_hash: [0u8; 32],
            hub_checkpoint: 0,
            hub_current_version: 0,
            error: Some(message.into()),
        }
    }

    /// Creates a rejecting response that still reveals the hub's setup
    /// hash, signalling schema drift.
    pub fn rejected_for_drift(hub_setup_hash: SetupHash, message: impl Into<String>) -> Self {
        Self {
            accepted: false,
            hub_endpoint: EndpointId::nil(),
            hub_setup_hash,
            hub_checkpoint: 0,
            hub_current_version: 0,
            error: Some(message.into()),
        }
    }
}

/// Carries one outgoing batch and requests the hub's next batch back.
///
/// `batch` is `None` once the spoke has delivered its final batch and is
/// only draining the hub's remaining batches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRequest {
    /// Scope being synchronized.
    pub scope: String,
    /// The spoke's endpoint identity.
    pub endpoint: EndpointId,
    /// The spoke's next batch, if it still has one to send.
    pub batch: Option<Batch>,
}

impl ExchangeRequest {
    /// Creates an exchange request carrying a batch.
    pub fn send(scope: impl Into<String>, endpoint: EndpointId, batch: Batch) -> Self {
        Self {
            scope: scope.into(),
            endpoint,
            batch: Some(batch),
        }
    }

    /// Creates a drain request (the spoke has nothing left to send).
    pub fn drain(scope: impl Into<String>, endpoint: EndpointId) -> Self {
        Self {
            scope: scope.into(),
            endpoint,
            batch: None,
        }
    }
}

/// Acknowledges an uploaded batch and, when the hub has outgoing
/// changes, returns the hub's next batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeResponse {
    /// Whether the uploaded batch was applied.
    pub accepted: bool,
    /// Rows applied on the hub from the uploaded batch.
    pub applied: u64,
    /// Conflicts the hub resolved while applying the uploaded batch.
    pub conflicts: u64,
    /// The hub's next outgoing batch, if any remain.
    pub reply: Option<Batch>,
    /// Error message when rejected.
    pub error: Option<String>,
}

impl ExchangeResponse {
    /// Creates an accepting response.
    pub fn accepted(applied: u64, conflicts: u64, reply: Option<Batch>) -> Self {
        Self {
            accepted: true,
            applied,
            conflicts,
            reply,
            error: None,
        }
    }

    /// Creates a rejecting response.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            accepted: false,
            applied: 0,
            conflicts: 0,
            reply: None,
            error: Some(message.into()),
        }
    }
}

/// Finalizes a session: both ends advance their checkpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRequest {
    /// Scope being synchronized.
    pub scope: String,
    /// The spoke's endpoint identity.
    pub endpoint: EndpointId,
    /// The spoke's version watermark delivered this session.
    pub version: u64,
    /// Session duration in milliseconds, recorded with the checkpoint.
    pub elapsed_ms: u64,
}

impl CommitRequest {
    /// Creates a commit request.
    pub fn new(
        scope: impl Into<String>,
        endpoint: EndpointId,
        version: u64,
        elapsed_ms: u64,
    ) -> Self {
        Self {
            scope: scope.into(),
            endpoint,
            version,
            elapsed_ms,
        }
    }
}

/// The hub's answer to a commit request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitResponse {
    /// Whether the hub advanced its checkpoint for the pair.
    pub committed: bool,
    /// The hub-side checkpoint version after the commit.
    pub checkpoint_version: u64,
    /// Error message when the commit was refused.
    pub error: Option<String>,
}

impl CommitResponse {
    /// Creates a successful commit response.
    pub fn committed(checkpoint_version: u64) -> Self {
        Self {
            committed: true,
            checkpoint_version,
            error: None,
        }
    }

    /// Creates a refused commit response.
    pub fn refused(message: impl Into<String>) -> Self {
        Self {
            committed: false,
            checkpoint_version: 0,
            error: Some(message.into()),
        }
    }

    /// Creates a refused commit response that reports the checkpoint
    /// version actually found, so a racing committer can retry against
    /// it.
    pub fn refused_at(checkpoint_version: u64, message: impl Into<String>) -> Self {
        Self {
            committed: false,
            checkpoint_version,
            error: Some(message.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ChangeRecord;
    use crate::value::RowKey;

    #[test]
    fn negotiate_roundtrip() {
        let request = NegotiateRequest::new("sales", EndpointId::generate(), [7u8; 32], 10);
        let bytes = crate::wire::encode(&request).unwrap();
        let decoded: NegotiateRequest = crate::wire::decode(&bytes).unwrap();

        assert_eq!(decoded, request);
        assert_eq!(decoded.protocol_version, PROTOCOL_VERSION);
    }

    #[test]
    fn negotiate_rejected_carries_error() {
        let response = NegotiateResponse::rejected("schema drift");
        assert!(!response.accepted);
        assert_eq!(response.hub_endpoint, EndpointId::nil());
        assert_eq!(response.error.as_deref(), Some("schema drift"));
    }

    #[test]
    fn exchange_roundtrip() {
        let batch = Batch::last(
            "sales",
            1,
            vec![ChangeRecord::delete("orders", RowKey::single(4i64), 17)],
        );
        let request = ExchangeRequest::send("sales", EndpointId::generate(), batch);

        let bytes = crate::wire::encode(&request).unwrap();
        let decoded: ExchangeRequest = crate::wire::decode(&bytes).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn drain_request_has_no_batch() {
        let request = ExchangeRequest::drain("sales", EndpointId::generate());
        assert!(request.batch.is_none());
    }

    #[test]
    fn commit_roundtrip() {
        let request = CommitRequest::new("sales", EndpointId::generate(), 42, 1800);
        let bytes = crate::wire::encode(&request).unwrap();
        let decoded: CommitRequest = crate::wire::decode(&bytes).unwrap();
        assert_eq!(decoded, request);

        let response = CommitResponse::committed(42);
        assert!(response.committed);
        assert_eq!(response.checkpoint_version, 42);
    }

    #[test]
    fn message_type_codes() {
        let negotiate = NegotiateRequest::new("s", EndpointId::nil(), [0u8; 32], 0);
        assert_eq!(SyncMessage::NegotiateRequest(negotiate).type_code(), 1);
        assert_eq!(
            SyncMessage::NegotiateResponse(NegotiateResponse::rejected("x")).type_code(),
            2
        );
        assert_eq!(
            SyncMessage::ExchangeRequest(ExchangeRequest::drain("s", EndpointId::nil()))
                .type_code(),
            3
        );
        assert_eq!(
            SyncMessage::ExchangeResponse(ExchangeResponse::accepted(0, 0, None)).type_code(),
            4
        );
        assert_eq!(
            SyncMessage::CommitRequest(CommitRequest::new("s", EndpointId::nil(), 0, 0))
                .type_code(),
            5
        );
        assert_eq!(
            SyncMessage::CommitResponse(CommitResponse::committed(0)).type_code(),
            6
        );
    }

    #[test]
    fn message_envelope_roundtrip() {
        let message = SyncMessage::ExchangeResponse(ExchangeResponse::accepted(3, 1, None));
        let bytes = message.encode().unwrap();
        let decoded = SyncMessage::decode(&bytes).unwrap();
        assert!(matches!(decoded, SyncMessage::ExchangeResponse(r) if r.applied == 3));
    }
}
