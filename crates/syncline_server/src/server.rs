//! The hub facade.

use crate::config::HubConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::{HubContext, RequestHandler};
use std::sync::Arc;
use syncline_core::SyncStore;
use syncline_protocol::{
    CommitRequest, CommitResponse, EndpointId, ExchangeRequest, ExchangeResponse,
    NegotiateRequest, NegotiateResponse, SyncMessage, COMMIT_PATH, EXCHANGE_PATH, NEGOTIATE_PATH,
};

/// The sync hub.
///
/// Serves negotiate / exchange / commit requests for any store
/// implementing the core contracts. The facade carries no transport: a
/// deployment mounts [`handle_frame`] on its own channel, and tests
/// route frames through the engine's loopback transport.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use syncline_core::MemoryStore;
/// use syncline_server::{HubConfig, SyncServer};
///
/// let store = Arc::new(MemoryStore::new());
/// let server = SyncServer::new(HubConfig::default(), store);
///
/// // Mount server.handle_frame(path, body) on an HTTP route, or call
/// // the typed handlers directly.
/// ```
///
/// [`handle_frame`]: SyncServer::handle_frame
pub struct SyncServer<S> {
    handler: RequestHandler<S>,
    context: Arc<HubContext<S>>,
}

impl<S: SyncStore> SyncServer<S> {
    /// Creates a hub with a fresh endpoint identity.
    pub fn new(config: HubConfig, store: Arc<S>) -> Self {
        Self::with_endpoint(config, EndpointId::generate(), store)
    }

    /// Creates a hub with a stable endpoint identity.
    ///
    /// Spokes key their checkpoints by the hub's identity, so a
    /// restarted hub must come back with the same one.
    pub fn with_endpoint(config: HubConfig, endpoint: EndpointId, store: Arc<S>) -> Self {
        let context = Arc::new(HubContext::new(config, endpoint, store));
        let handler = RequestHandler::new(Arc::clone(&context));
        Self { handler, context }
    }

    /// Returns the hub's endpoint identity.
    pub fn endpoint(&self) -> EndpointId {
        self.context.endpoint
    }

    /// Returns the number of active sessions.
    pub fn session_count(&self) -> usize {
        self.context.session_count()
    }

    /// Returns the hub's context (store and registry access).
    pub fn context(&self) -> &Arc<HubContext<S>> {
        &self.context
    }

    /// Handles a negotiation request.
    pub fn handle_negotiate(&self, request: NegotiateRequest) -> ServerResult<NegotiateResponse> {
        self.handler.handle_negotiate(request)
    }

    /// Handles an exchange request.
    pub fn handle_exchange(&self, request: ExchangeRequest) -> ServerResult<ExchangeResponse> {
        self.handler.handle_exchange(request)
    }

    /// Handles a commit request.
    pub fn handle_commit(&self, request: CommitRequest) -> ServerResult<CommitResponse> {
        self.handler.handle_commit(request)
    }

    /// Dispatches a typed sync message to the matching handler.
    pub fn handle_message(&self, message: SyncMessage) -> ServerResult<SyncMessage> {
        match message {
            SyncMessage::NegotiateRequest(request) => self
                .handle_negotiate(request)
                .map(SyncMessage::NegotiateResponse),
            SyncMessage::ExchangeRequest(request) => self
                .handle_exchange(request)
                .map(SyncMessage::ExchangeResponse),
            SyncMessage::CommitRequest(request) => {
                self.handle_commit(request).map(SyncMessage::CommitResponse)
            }
            other => Err(ServerError::InvalidRequest(format!(
                "unexpected message type code {}",
                other.type_code()
            ))),
        }
    }

    /// Handles one CBOR frame addressed to a sync endpoint path.
    ///
    /// This is the seam a deployment mounts on its request/response
    /// channel; the body and the returned bytes are CBOR-encoded
    /// request and response messages.
    pub fn handle_frame(&self, path: &str, body: &[u8]) -> ServerResult<Vec<u8>> {
        match path {
            NEGOTIATE_PATH => {
                let request: NegotiateRequest = syncline_protocol::decode(body)?;
                let response = self.handle_negotiate(request)?;
                Ok(syncline_protocol::encode(&response)?)
            }
            EXCHANGE_PATH => {
                let request: ExchangeRequest = syncline_protocol::decode(body)?;
                let response = self.handle_exchange(request)?;
                Ok(syncline_protocol::encode(&response)?)
            }
            COMMIT_PATH => {
                let request: CommitRequest = syncline_protocol::decode(body)?;
                let response = self.handle_commit(request)?;
                Ok(syncline_protocol::encode(&response)?)
            }
            other => Err(ServerError::InvalidRequest(format!(
                "unknown path: {other}"
            ))),
        }
    }
}
