//! Request handlers for the sync endpoints.

use crate::config::HubConfig;
use crate::error::ServerResult;
use crate::session::{HubSession, SessionRegistry};
use std::sync::Arc;
use syncline_core::{reconcile_batch, CoreError, ScopeRegistry, SyncStore};
use syncline_protocol::{
    CommitRequest, CommitResponse, EndpointId, ExchangeRequest, ExchangeResponse,
    NegotiateRequest, NegotiateResponse, SyncRole,
};

/// Shared context for request handling.
pub struct HubContext<S> {
    /// Hub configuration.
    pub config: HubConfig,
    /// The hub's endpoint identity.
    pub endpoint: EndpointId,
    store: Arc<S>,
    registry: ScopeRegistry<S>,
    sessions: SessionRegistry<S>,
}

impl<S: SyncStore> HubContext<S> {
    /// Creates a context over a store.
    pub fn new(config: HubConfig, endpoint: EndpointId, store: Arc<S>) -> Self {
        let registry = ScopeRegistry::new(Arc::clone(&store));
        Self {
            config,
            endpoint,
            store,
            registry,
            sessions: SessionRegistry::new(),
        }
    }

    /// Returns the hub's store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Returns the hub's scope registry.
    pub fn registry(&self) -> &ScopeRegistry<S> {
        &self.registry
    }

    /// Returns the number of active sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

/// Handler for sync requests.
pub struct RequestHandler<S> {
    context: Arc<HubContext<S>>,
}

impl<S: SyncStore> RequestHandler<S> {
    /// Creates a handler over a context.
    pub fn new(context: Arc<HubContext<S>>) -> Self {
        Self { context }
    }

    /// Handles a negotiation request.
    ///
    /// Validates the protocol version and the scope's setup hash, looks
    /// up the pair's checkpoint, and registers a fresh session,
    /// replacing any stale one left by an aborted attempt.
    pub fn handle_negotiate(
        &self,
        request: NegotiateRequest,
    ) -> ServerResult<NegotiateResponse> {
        if request.protocol_version != self.context.config.protocol_version {
            return Ok(NegotiateResponse::rejected(format!(
                "unsupported protocol version: {}",
                request.protocol_version
            )));
        }

        let Some(meta) = self.context.store.scope_meta(&request.scope)? else {
            return Ok(NegotiateResponse::rejected(format!(
                "unknown scope: {}",
                request.scope
            )));
        };

        if meta.setup_hash != request.setup_hash {
            tracing::warn!(
                scope = %request.scope,
                endpoint = %request.endpoint,
                "rejecting session: setup hash mismatch"
            );
            return Ok(NegotiateResponse::rejected_for_drift(
                meta.setup_hash,
                "setup hash mismatch between ends",
            ));
        }

        let checkpoint = self
            .context
            .registry
            .checkpoint(&request.scope, &request.endpoint)?;
        let expected = checkpoint.map(|c| c.last_sync_version);
        let baseline = expected.unwrap_or(0);

        let session = HubSession::new(
            Arc::clone(&self.context.store),
            meta.def.clone(),
            request.endpoint,
            baseline,
            expected,
            self.context.config.max_batch_rows,
        )?;
        let current = session.through_version();
        self.context
            .sessions
            .insert(&request.scope, request.endpoint, session);

        tracing::info!(
            scope = %request.scope,
            endpoint = %request.endpoint,
            baseline,
            current,
            "session negotiated"
        );
        Ok(NegotiateResponse::accepted(
            self.context.endpoint,
            meta.setup_hash,
            baseline,
            current,
        ))
    }

    /// Handles an exchange request.
    ///
    /// Applies the uploaded batch (if any) in one transaction with
    /// hub-side conflict resolution, then returns the hub's next
    /// outgoing batch. The session lock makes applies for one pair
    /// strictly sequential.
    pub fn handle_exchange(&self, request: ExchangeRequest) -> ServerResult<ExchangeResponse> {
        let Some(session) = self.context.sessions.get(&request.scope, &request.endpoint) else {
            return Ok(ExchangeResponse::rejected("no active session"));
        };
        let mut session = session.lock();

        let mut applied = 0;
        let mut conflicts = 0;

        if let Some(batch) = &request.batch {
            if batch.len() > self.context.config.max_batch_rows {
                return Ok(ExchangeResponse::rejected(format!(
                    "batch of {} rows exceeds limit {}",
                    batch.len(),
                    self.context.config.max_batch_rows
                )));
            }

            let plan = reconcile_batch(
                &*self.context.store,
                session.baseline(),
                self.context.config.policy,
                SyncRole::Hub,
                batch,
            )?;
            conflicts = plan.conflict_count();
            session.add_conflicts(conflicts);

            let receipt =
                self.context
                    .store
                    .apply(&request.scope, &request.endpoint, &plan.to_apply)?;
            applied = receipt.applied;

            tracing::debug!(
                scope = %request.scope,
                endpoint = %request.endpoint,
                sequence = batch.sequence,
                rows = batch.len(),
                applied,
                conflicts,
                "applied uploaded batch"
            );
        }

        let reply = session.next_outgoing()?;
        Ok(ExchangeResponse::accepted(applied, conflicts, reply))
    }

    /// Handles a commit request.
    ///
    /// Advances the hub's checkpoint for the pair via compare-and-swap
    /// and retires the session. A racing commit is refused with the
    /// checkpoint version actually found, so the spoke retries its
    /// whole session against it.
    pub fn handle_commit(&self, request: CommitRequest) -> ServerResult<CommitResponse> {
        let Some(session) = self.context.sessions.remove(&request.scope, &request.endpoint)
        else {
            return Ok(CommitResponse::refused("no active session"));
        };
        let session = session.lock();

        let through = session.through_version();
        let elapsed = session.started().elapsed();

        match self.context.registry.commit(
            &request.scope,
            &request.endpoint,
            session.expected(),
            through,
            elapsed,
        ) {
            Ok(checkpoint) => {
                // Observe the spoke's delivered watermark for the scope.
                self.context
                    .store
                    .mark_applied(&request.scope, request.version)?;
                tracing::info!(
                    scope = %request.scope,
                    endpoint = %request.endpoint,
                    checkpoint = checkpoint.last_sync_version,
                    conflicts = session.conflicts(),
                    reinitialized = session.reinitialized(),
                    spoke_elapsed_ms = request.elapsed_ms,
                    "session committed"
                );
                Ok(CommitResponse::committed(checkpoint.last_sync_version))
            }
            Err(CoreError::CheckpointRace { actual, .. }) => Ok(CommitResponse::refused_at(
                actual,
                "checkpoint moved during the session",
            )),
            Err(other) => Err(other.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use syncline_core::{ApplyStore, MemoryStore, SchemaStore, VersionStore};
    use syncline_protocol::{
        Batch, ChangeRecord, ColumnDef, ColumnType, RowKey, ScalarValue, ScopeDef, TableDef,
        PROTOCOL_VERSION,
    };

    fn scope_def() -> ScopeDef {
        ScopeDef::new(
            "sales",
            vec![TableDef::new(
                "orders",
                vec![ColumnDef::new("qty", ColumnType::Integer)],
                vec!["id".into()],
            )],
        )
    }

    fn handler() -> (RequestHandler<MemoryStore>, Arc<HubContext<MemoryStore>>) {
        let store = Arc::new(MemoryStore::new());
        let def = scope_def();
        let hash = def.setup_hash().unwrap();
        store.create_scope(&def, hash).unwrap();

        let context = Arc::new(HubContext::new(
            HubConfig::default(),
            EndpointId::generate(),
            store,
        ));
        (RequestHandler::new(Arc::clone(&context)), context)
    }

    fn negotiate(handler: &RequestHandler<MemoryStore>, endpoint: EndpointId) -> NegotiateResponse {
        let hash = scope_def().setup_hash().unwrap();
        handler
            .handle_negotiate(NegotiateRequest::new("sales", endpoint, hash, 0))
            .unwrap()
    }

    fn payload(qty: i64) -> BTreeMap<String, ScalarValue> {
        let mut map = BTreeMap::new();
        map.insert("qty".to_string(), qty.into());
        map
    }

    #[test]
    fn negotiate_accepts_matching_hash() {
        let (handler, context) = handler();
        let endpoint = EndpointId::generate();

        let response = negotiate(&handler, endpoint);
        assert!(response.accepted);
        assert_eq!(response.hub_endpoint, context.endpoint);
        assert_eq!(response.hub_checkpoint, 0);
        assert_eq!(context.session_count(), 1);
    }

    #[test]
    fn negotiate_rejects_bad_protocol_version() {
        let (handler, _) = handler();
        let request = NegotiateRequest {
            scope: "sales".into(),
            endpoint: EndpointId::generate(),
            setup_hash: scope_def().setup_hash().unwrap(),
            protocol_version: PROTOCOL_VERSION + 1,
            last_sync_version: 0,
        };

        let response = handler.handle_negotiate(request).unwrap();
        assert!(!response.accepted);
        assert!(response.error.unwrap().contains("protocol version"));
    }

    #[test]
    fn negotiate_rejects_drift_with_hub_hash() {
        let (handler, _) = handler();
        let request =
            NegotiateRequest::new("sales", EndpointId::generate(), [9u8; 32], 0);

        let response = handler.handle_negotiate(request).unwrap();
        assert!(!response.accepted);
        // The drift rejection reveals the hub's hash so the spoke can
        // tell drift apart from other refusals.
        assert_eq!(response.hub_setup_hash, scope_def().setup_hash().unwrap());
    }

    #[test]
    fn negotiate_rejects_unknown_scope() {
        let (handler, _) = handler();
        let request = NegotiateRequest::new(
            "inventory",
            EndpointId::generate(),
            scope_def().setup_hash().unwrap(),
            0,
        );

        let response = handler.handle_negotiate(request).unwrap();
        assert!(!response.accepted);
        assert_eq!(response.hub_setup_hash, [0u8; 32]);
    }

    #[test]
    fn exchange_without_session_is_rejected() {
        let (handler, _) = handler();
        let request = ExchangeRequest::drain("sales", EndpointId::generate());

        let response = handler.handle_exchange(request).unwrap();
        assert!(!response.accepted);
    }

    #[test]
    fn exchange_applies_and_replies() {
        let (handler, context) = handler();
        let endpoint = EndpointId::generate();

        // Hub has one row of its own to send down.
        context
            .store()
            .put_row("orders", RowKey::single(100i64), payload(1))
            .unwrap();

        negotiate(&handler, endpoint);

        let upload = Batch::last(
            "sales",
            1,
            vec![ChangeRecord::insert(
                "orders",
                RowKey::single(1i64),
                5,
                payload(9),
            )],
        );
        let response = handler
            .handle_exchange(ExchangeRequest::send("sales", endpoint, upload))
            .unwrap();

        assert!(response.accepted);
        assert_eq!(response.applied, 1);
        let reply = response.reply.unwrap();
        assert_eq!(reply.len(), 1);
        assert!(reply.is_last);

        // The uploaded row landed in the hub store.
        assert!(context
            .store()
            .read_row("orders", &RowKey::single(1i64))
            .unwrap()
            .is_some());
    }

    #[test]
    fn exchange_enforces_batch_limit() {
        let store = Arc::new(MemoryStore::new());
        let def = scope_def();
        let hash = def.setup_hash().unwrap();
        store.create_scope(&def, hash).unwrap();

        let context = Arc::new(HubContext::new(
            HubConfig::new().with_max_batch_rows(1),
            EndpointId::generate(),
            store,
        ));
        let handler = RequestHandler::new(Arc::clone(&context));
        let endpoint = EndpointId::generate();
        negotiate(&handler, endpoint);

        let oversized = Batch::last(
            "sales",
            1,
            vec![
                ChangeRecord::insert("orders", RowKey::single(1i64), 1, payload(1)),
                ChangeRecord::insert("orders", RowKey::single(2i64), 2, payload(2)),
            ],
        );
        let response = handler
            .handle_exchange(ExchangeRequest::send("sales", endpoint, oversized))
            .unwrap();

        assert!(!response.accepted);
        assert!(response.error.unwrap().contains("exceeds limit"));
    }

    #[test]
    fn hub_resolves_conflicts_under_its_policy() {
        let (handler, context) = handler();
        let endpoint = EndpointId::generate();

        // A hub-local edit is pending for the same row the spoke sends.
        context
            .store()
            .put_row("orders", RowKey::single(1i64), payload(7))
            .unwrap();
        negotiate(&handler, endpoint);

        let upload = Batch::last(
            "sales",
            1,
            vec![ChangeRecord::update(
                "orders",
                RowKey::single(1i64),
                9,
                payload(2),
            )],
        );
        let response = handler
            .handle_exchange(ExchangeRequest::send("sales", endpoint, upload))
            .unwrap();

        // ServerWins on the hub keeps the hub's payload.
        assert_eq!(response.conflicts, 1);
        assert_eq!(response.applied, 0);
        let (row, _) = context
            .store()
            .read_row("orders", &RowKey::single(1i64))
            .unwrap()
            .unwrap();
        assert_eq!(row.get("qty"), Some(&ScalarValue::Integer(7)));
    }

    #[test]
    fn commit_advances_checkpoint_and_retires_session() {
        let (handler, context) = handler();
        let endpoint = EndpointId::generate();
        negotiate(&handler, endpoint);

        let response = handler
            .handle_exchange(ExchangeRequest::drain("sales", endpoint))
            .unwrap();
        assert!(response.accepted);

        let commit = handler
            .handle_commit(CommitRequest::new("sales", endpoint, 3, 120))
            .unwrap();
        assert!(commit.committed);
        assert_eq!(context.session_count(), 0);

        // Committing again without a session is refused.
        let again = handler
            .handle_commit(CommitRequest::new("sales", endpoint, 3, 120))
            .unwrap();
        assert!(!again.committed);
    }

    #[test]
    fn racing_commit_is_refused_with_found_version() {
        let (handler, context) = handler();
        let endpoint = EndpointId::generate();

        // A first session commits normally.
        negotiate(&handler, endpoint);
        handler
            .handle_commit(CommitRequest::new("sales", endpoint, 0, 0))
            .unwrap();

        // A second session negotiates, but a third one commits first.
        negotiate(&handler, endpoint);

        // Simulate the interleaved commit by moving the checkpoint
        // underneath the active session.
        context
            .store()
            .put_row("orders", RowKey::single(1i64), payload(1))
            .unwrap();
        let through = context.store().current_version("sales").unwrap();
        context
            .registry()
            .commit("sales", &endpoint, Some(0), through, std::time::Duration::ZERO)
            .unwrap();

        let refused = handler
            .handle_commit(CommitRequest::new("sales", endpoint, 0, 0))
            .unwrap();
        assert!(!refused.committed);
        assert_eq!(refused.checkpoint_version, through);
    }
}
