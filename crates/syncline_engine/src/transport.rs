//! Transport layer abstraction for sync sessions.

use crate::error::{SyncError, SyncResult};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use syncline_protocol::{
    CommitRequest, CommitResponse, ExchangeRequest, ExchangeResponse, NegotiateRequest,
    NegotiateResponse,
};

/// A sync transport handles request/response exchange with the hub.
///
/// This trait abstracts the network layer; the engine only requires
/// bidirectional request/response semantics per batch and assumes no
/// message-queue behavior. Implementations decide how frames travel
/// (HTTP, a loopback call, a mock).
pub trait SyncTransport: Send + Sync {
    /// Opens a session with the hub.
    fn negotiate(&self, request: &NegotiateRequest) -> SyncResult<NegotiateResponse>;

    /// Sends one batch (or a drain request) and receives the hub's
    /// acknowledgement plus its next batch, if any.
    fn exchange(&self, request: &ExchangeRequest) -> SyncResult<ExchangeResponse>;

    /// Finalizes a session so both ends advance their checkpoints.
    fn commit(&self, request: &CommitRequest) -> SyncResult<CommitResponse>;

    /// Checks if the transport is connected.
    fn is_connected(&self) -> bool;

    /// Closes the transport connection.
    fn close(&self) -> SyncResult<()>;
}

impl<T: SyncTransport + ?Sized> SyncTransport for Arc<T> {
    fn negotiate(&self, request: &NegotiateRequest) -> SyncResult<NegotiateResponse> {
        (**self).negotiate(request)
    }

    fn exchange(&self, request: &ExchangeRequest) -> SyncResult<ExchangeResponse> {
        (**self).exchange(request)
    }

    fn commit(&self, request: &CommitRequest) -> SyncResult<CommitResponse> {
        (**self).commit(request)
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn close(&self) -> SyncResult<()> {
        (**self).close()
    }
}

/// A mock transport for unit tests.
///
/// Responses are queued per request kind; exchange responses pop in
/// FIFO order so multi-batch sessions can be scripted.
#[derive(Default)]
pub struct MockTransport {
    connected: AtomicBool,
    negotiate_response: Mutex<Option<NegotiateResponse>>,
    exchange_responses: Mutex<VecDeque<SyncResult<ExchangeResponse>>>,
    commit_response: Mutex<Option<CommitResponse>>,
    requests_seen: Mutex<Vec<&'static str>>,
}

impl MockTransport {
    /// Creates a connected mock transport.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            negotiate_response: Mutex::new(None),
            exchange_responses: Mutex::new(VecDeque::new()),
            commit_response: Mutex::new(None),
            requests_seen: Mutex::new(Vec::new()),
        }
    }

    /// Sets the negotiation response.
    pub fn set_negotiate_response(&self, response: NegotiateResponse) {
        *self.negotiate_response.lock() = Some(response);
    }

    /// Queues an exchange response.
    pub fn push_exchange_response(&self, response: ExchangeResponse) {
        self.exchange_responses.lock().push_back(Ok(response));
    }

    /// Queues an exchange failure.
    pub fn push_exchange_error(&self, error: SyncError) {
        self.exchange_responses.lock().push_back(Err(error));
    }

    /// Sets the commit response.
    pub fn set_commit_response(&self, response: CommitResponse) {
        *self.commit_response.lock() = Some(response);
    }

    /// Sets the connected state.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Returns the request kinds seen, in order.
    pub fn requests_seen(&self) -> Vec<&'static str> {
        self.requests_seen.lock().clone()
    }
}

impl SyncTransport for MockTransport {
    fn negotiate(&self, _request: &NegotiateRequest) -> SyncResult<NegotiateResponse> {
        if !self.is_connected() {
            return Err(SyncError::Transient("not connected".into()));
        }
        self.requests_seen.lock().push("negotiate");
        self.negotiate_response
            .lock()
            .clone()
            .ok_or_else(|| SyncError::Protocol("no mock negotiate response set".into()))
    }

    fn exchange(&self, _request: &ExchangeRequest) -> SyncResult<ExchangeResponse> {
        if !self.is_connected() {
            return Err(SyncError::Transient("not connected".into()));
        }
        self.requests_seen.lock().push("exchange");
        self.exchange_responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(SyncError::Protocol("no mock exchange response queued".into())))
    }

    fn commit(&self, _request: &CommitRequest) -> SyncResult<CommitResponse> {
        if !self.is_connected() {
            return Err(SyncError::Transient("not connected".into()));
        }
        self.requests_seen.lock().push("commit");
        self.commit_response
            .lock()
            .clone()
            .ok_or_else(|| SyncError::Protocol("no mock commit response set".into()))
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

    #[test]
    fn mock_connection_state() {
        let transport = MockTransport::new();
        assert!(transport.is_connected());

        transport.close().unwrap();
        assert!(!transport.is_connected());

        let request = NegotiateRequest::new("sales", EndpointId::generate(), [0u8; 32], 0);
        let result = transport.negotiate(&request);
        assert!(matches!(result, Err(SyncError::Transient(_))));
    }

    #[test]
    fn exchange_responses_pop_in_order() {
        let transport = MockTransport::new();
        transport.push_exchange_response(ExchangeResponse::accepted(1, 0, None));
        transport.push_exchange_response(ExchangeResponse::accepted(2, 0, None));

        let request = ExchangeRequest::drain("sales", EndpointId::generate());
        assert_eq!(transport.exchange(&request).unwrap().applied, 1);
        assert_eq!(transport.exchange(&request).unwrap().applied, 2);
        assert!(transport.exchange(&request).is_err());
    }

    #[test]
    fn records_request_order() {
        let transport = MockTransport::new();
        transport.set_negotiate_response(NegotiateResponse::rejected("x"));
        transport.set_commit_response(CommitResponse::committed(0));

        let negotiate = NegotiateRequest::new("sales", EndpointId::generate(), [0u8; 32], 0);
        let commit = CommitRequest::new("sales", EndpointId::generate(), 0, 0);
        transport.negotiate(&negotiate).unwrap();
        transport.commit(&commit).unwrap();

        assert_eq!(transport.requests_seen(), vec!["negotiate", "commit"]);
    }
}
