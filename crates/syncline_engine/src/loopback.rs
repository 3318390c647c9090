//! Loopback transport routing CBOR frames to an in-process server.
//!
//! The engine does not carry HTTP framing; a real deployment mounts the
//! same three endpoints on whatever channel it already has. The
//! loopback pair exercises the full encode/decode path without a
//! network, which is how integration tests drive a hub.

use crate::error::{SyncError, SyncResult};
use crate::transport::SyncTransport;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use syncline_protocol::{
    CommitRequest, CommitResponse, ExchangeRequest, ExchangeResponse, NegotiateRequest,
    NegotiateResponse, COMMIT_PATH, EXCHANGE_PATH, NEGOTIATE_PATH,
};

/// A server that can handle loopback frames.
///
/// Implemented by hub facades; each call carries one CBOR-encoded
/// request body and returns one CBOR-encoded response body.
pub trait LoopbackServer: Send + Sync {
    /// Handles one frame addressed to `path`.
    fn handle_frame(&self, path: &str, body: &[u8]) -> Result<Vec<u8>, String>;
}

/// A transport that routes frames directly to a [`LoopbackServer`].
pub struct LoopbackTransport<S> {
    server: S,
    connected: AtomicBool,
}

impl<S: LoopbackServer> LoopbackTransport<S> {
    /// Creates a loopback transport over the given server.
    pub fn new(server: S) -> Self {
        Self {
            server,
            connected: AtomicBool::new(true),
        }
    }

    fn round_trip<Req, Res>(&self, path: &str, request: &Req) -> SyncResult<Res>
    where
        Req: Serialize,
        Res: DeserializeOwned,
    {
        if !self.is_connected() {
            return Err(SyncError::Transient("transport closed".into()));
        }

        let body = syncline_protocol::encode(request)?;
        let response = self
            .server
            .handle_frame(path, &body)
            .map_err(SyncError::Transient)?;
        Ok(syncline_protocol::decode(&response)?)
    }
}

impl<S: LoopbackServer> SyncTransport for LoopbackTransport<S> {
    fn negotiate(&self, request: &NegotiateRequest) -> SyncResult<NegotiateResponse> {
        self.round_trip(NEGOTIATE_PATH, request)
    }

    fn exchange(&self, request: &ExchangeRequest) -> SyncResult<ExchangeResponse> {
        self.round_trip(EXCHANGE_PATH, request)
    }

    fn commit(&self, request: &CommitRequest) -> SyncResult<CommitResponse> {
        self.round_trip(COMMIT_PATH, request)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn close(&self) -> SyncResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syncline_protocol::EndpointId;

    /// Echo server that rejects every negotiation with a fixed message.
    struct RejectingServer;

    impl LoopbackServer for RejectingServer {
        fn handle_frame(&self, path: &str, body: &[u8]) -> Result<Vec<u8>, String> {
            match path {
                NEGOTIATE_PATH => {
                    let request: NegotiateRequest =
                        syncline_protocol::decode(body).map_err(|e| e.to_string())?;
                    let response = NegotiateResponse::rejected(format!(
                        "scope {} not served here",
                        request.scope
                    ));
                    syncline_protocol::encode(&response).map_err(|e| e.to_string())
                }
                _ => Err(format!("unexpected path {path}")),
            }
        }
    }

    #[test]
    fn frames_round_trip_through_the_server() {
        let transport = LoopbackTransport::new(RejectingServer);
        let request = NegotiateRequest::new("sales", EndpointId::generate(), [0u8; 32], 0);

        let response = transport.negotiate(&request).unwrap();
        assert!(!response.accepted);
        assert!(response.error.unwrap().contains("sales"));
    }

    #[test]
    fn server_errors_surface_as_transient() {
        let transport = LoopbackTransport::new(RejectingServer);
        let request = ExchangeRequest::drain("sales", EndpointId::generate());

        let result = transport.exchange(&request);
        assert!(matches!(result, Err(SyncError::Transient(_))));
    }

    #[test]
    fn closed_transport_refuses_frames() {
        let transport = LoopbackTransport::new(RejectingServer);
        transport.close().unwrap();
        assert!(!transport.is_connected());

        let request = NegotiateRequest::new("sales", EndpointId::generate(), [0u8; 32], 0);
        assert!(transport.negotiate(&request).is_err());
    }
}
