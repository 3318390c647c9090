//! The sync session state machine.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::session::{EngineStats, SessionState, SessionSummary};
use crate::transport::SyncTransport;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use syncline_core::{reconcile_batch, BatchBuilder, CoreError, ScopeRegistry, SyncStore};
use syncline_protocol::{
    Batch, CommitRequest, EndpointId, ExchangeRequest, NegotiateRequest, SetupHash, SyncRole,
};

/// Drives full synchronization sessions against a hub.
///
/// One orchestrator serves one spoke store. A session negotiates the
/// scope, pulls the baseline checkpoint, exchanges batches in both
/// directions, applies incoming batches transactionally with conflict
/// resolution, and commits the new checkpoint. A session that faults
/// leaves the checkpoint untouched, so the next session retries from
/// the old one.
///
/// Sessions run synchronously on the calling thread. Multiple
/// orchestrator instances (one per scope/endpoint relationship) may run
/// concurrently; the only cross-session serialization point is the
/// per-pair checkpoint commit.
pub struct SyncOrchestrator<S, T> {
    config: SyncConfig,
    store: Arc<S>,
    transport: Arc<T>,
    registry: ScopeRegistry<S>,
    state: RwLock<SessionState>,
    stats: RwLock<EngineStats>,
    cancelled: AtomicBool,
}

impl<S: SyncStore, T: SyncTransport> SyncOrchestrator<S, T> {
    /// Creates an orchestrator over a store and a transport.
    pub fn new(config: SyncConfig, store: Arc<S>, transport: T) -> Self {
        let registry = ScopeRegistry::new(Arc::clone(&store));
        Self {
            config,
            store,
            transport: Arc::new(transport),
            registry,
            state: RwLock::new(SessionState::Idle),
            stats: RwLock::new(EngineStats::default()),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Returns the current session state.
    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    /// Returns cumulative statistics.
    pub fn stats(&self) -> EngineStats {
        self.stats.read().clone()
    }

    /// Returns the scope registry backing this orchestrator.
    pub fn registry(&self) -> &ScopeRegistry<S> {
        &self.registry
    }

    /// Requests cancellation of the ongoing session.
    ///
    /// Cancellation is honored between batches; an in-flight apply
    /// transaction always completes or rolls back whole. The flag is
    /// sticky until [`reset_cancel`] is called.
    ///
    /// [`reset_cancel`]: SyncOrchestrator::reset_cancel
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Clears the cancellation flag.
    pub fn reset_cancel(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }

    fn check_cancelled(&self) -> SyncResult<()> {
        if self.cancelled.load(Ordering::SeqCst) {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn check_deadline(&self, started: Instant) -> SyncResult<()> {
        if started.elapsed() >= self.config.session_timeout {
            Err(SyncError::Timeout(self.config.session_timeout))
        } else {
            Ok(())
        }
    }

    fn set_state(&self, state: SessionState) {
        *self.state.write() = state;
    }

    /// Runs one synchronization session for a scope (a single attempt).
    ///
    /// On success the checkpoint has advanced on both ends. On error
    /// the session is `Faulted`, no checkpoint moved, and the caller
    /// (or [`sync_scope_with_retry`]) decides whether to retry.
    ///
    /// [`sync_scope_with_retry`]: SyncOrchestrator::sync_scope_with_retry
    pub fn sync_scope(&self, scope: &str) -> SyncResult<SessionSummary> {
        let started = Instant::now();

        if !self.state().can_start() {
            return Err(SyncError::Rejected(format!(
                "session already active in state {}",
                self.state()
            )));
        }

        let result = self.run_session(scope, started);
        match &result {
            Ok(summary) => {
                let mut stats = self.stats.write();
                stats.sessions_completed += 1;
                stats.rows_pushed += summary.pushed_rows;
                stats.rows_pulled += summary.pulled_rows;
                stats.conflicts_resolved += summary.conflicts_local;
                stats.last_error = None;
                drop(stats);
                self.set_state(SessionState::Idle);
            }
            Err(error) => {
                let mut stats = self.stats.write();
                stats.sessions_faulted += 1;
                stats.last_error = Some(error.to_string());
                drop(stats);
                self.set_state(SessionState::Faulted);
                tracing::warn!(scope, error = %error, "sync session faulted");
            }
        }
        result
    }

    /// Runs a session with session-level retry on transient errors.
    ///
    /// The whole session is retried, never an individual batch: the
    /// checkpoint has not moved after a fault, so a rerun is
    /// idempotent. Fatal errors (schema drift) are surfaced
    /// immediately; transient ones only after the fixed attempt budget
    /// is spent, with the attempt count and last error preserved.
    pub fn sync_scope_with_retry(&self, scope: &str) -> SyncResult<SessionSummary> {
        let max_attempts = self.config.retry.max_attempts;
        let mut last_error: Option<SyncError> = None;

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                std::thread::sleep(self.config.retry.delay);
                self.stats.write().retries += 1;
            }
            self.check_cancelled()?;

            match self.sync_scope(scope) {
                Ok(mut summary) => {
                    summary.attempts = attempt;
                    return Ok(summary);
                }
                Err(error) if error.is_retryable() => {
                    if attempt < max_attempts {
                        tracing::warn!(
                            scope,
                            attempt,
                            error = %error,
                            "session attempt failed; retrying"
                        );
                        last_error = Some(error);
                    } else {
                        return Err(SyncError::RetriesExhausted {
                            attempts: max_attempts,
                            last: Box::new(error),
                        });
                    }
                }
                Err(error) => return Err(error),
            }
        }

        Err(last_error
            .map(|error| SyncError::RetriesExhausted {
                attempts: max_attempts,
                last: Box::new(error),
            })
            .unwrap_or_else(|| SyncError::Transient("no sync attempts made".into())))
    }

    fn run_session(&self, scope: &str, started: Instant) -> SyncResult<SessionSummary> {
        let meta = self
            .store
            .scope_meta(scope)
            .map_err(SyncError::from)?
            .ok_or_else(|| SyncError::UnknownScope(scope.to_string()))?;

        self.check_cancelled()?;
        self.set_state(SessionState::NegotiatingScope);
        tracing::info!(scope, endpoint = %self.config.endpoint, "sync session started");

        let hub = self.negotiate(scope, meta.setup_hash)?;
        let mut summary = SessionSummary::new(scope, hub);

        self.set_state(SessionState::PullingBaseline);
        let expected = self
            .registry
            .checkpoint(scope, &hub)?
            .map(|c| c.last_sync_version);
        // No checkpoint yet means a full first sync from version zero.
        let baseline = expected.unwrap_or(0);

        let mut builder = BatchBuilder::incremental(
            Arc::clone(&self.store),
            meta.def.clone(),
            hub,
            baseline,
            self.config.max_rows_per_batch,
        )?;

        self.set_state(SessionState::ExchangingBatches);
        let mut sent_last = false;
        let mut hub_done = false;

        while !(sent_last && hub_done) {
            self.check_cancelled()?;
            self.check_deadline(started)?;

            let outgoing = if sent_last {
                None
            } else {
                match builder.next_batch() {
                    Ok(batch) => batch,
                    Err(CoreError::TrackingUnavailable {
                        table,
                        requested,
                        floor,
                    }) => {
                        tracing::warn!(
                            scope,
                            table = %table,
                            requested,
                            floor,
                            "tracked history gone; reinitializing from snapshot"
                        );
                        summary.reinitialized = true;
                        builder = BatchBuilder::snapshot(
                            Arc::clone(&self.store),
                            meta.def.clone(),
                            hub,
                            self.config.max_rows_per_batch,
                        )?;
                        continue;
                    }
                    Err(error) => return Err(error.into()),
                }
            };

            let request = match outgoing {
                Some(batch) => {
                    sent_last = batch.is_last;
                    summary.pushed_rows += batch.len() as u64;
                    summary.batches_sent += 1;
                    tracing::debug!(
                        scope,
                        sequence = batch.sequence,
                        rows = batch.len(),
                        is_last = batch.is_last,
                        "sending batch"
                    );
                    ExchangeRequest::send(scope, self.config.endpoint, batch)
                }
                None => ExchangeRequest::drain(scope, self.config.endpoint),
            };

            let response = self.transport.exchange(&request)?;
            if !response.accepted {
                return Err(SyncError::Rejected(
                    response
                        .error
                        .unwrap_or_else(|| "exchange rejected".into()),
                ));
            }
            summary.conflicts_remote += response.conflicts;

            match response.reply {
                Some(reply) => {
                    summary.batches_received += 1;
                    hub_done = reply.is_last;
                    let (applied, conflicts) =
                        self.apply_incoming(scope, &hub, baseline, &reply)?;
                    summary.pulled_rows += applied;
                    summary.conflicts_local += conflicts;
                    self.set_state(SessionState::ExchangingBatches);
                }
                None => hub_done = true,
            }
        }

        self.set_state(SessionState::CommittingCheckpoint);
        let through = builder.through_version();
        let elapsed = started.elapsed();

        let commit = CommitRequest::new(
            scope,
            self.config.endpoint,
            through,
            elapsed.as_millis() as u64,
        );
        let response = self.transport.commit(&commit)?;
        if !response.committed {
            // The hub found a different checkpoint than this session
            // established; another session for the pair got there first.
            return Err(SyncError::CheckpointRace {
                scope: scope.to_string(),
                expected: through,
                actual: response.checkpoint_version,
            });
        }

        // The hub committed first; if we fault between here and the
        // local commit, re-delivered batches apply idempotently.
        self.registry
            .commit(scope, &hub, expected, through, elapsed)?;
        self.store
            .mark_applied(scope, through)
            .map_err(SyncError::from)?;

        summary.checkpoint_version = through;
        summary.duration = started.elapsed();
        tracing::info!(
            scope,
            endpoint = %self.config.endpoint,
            pushed = summary.pushed_rows,
            pulled = summary.pulled_rows,
            conflicts = summary.total_conflicts(),
            batches_sent = summary.batches_sent,
            batches_received = summary.batches_received,
            reinitialized = summary.reinitialized,
            checkpoint = through,
            duration_ms = summary.duration.as_millis() as u64,
            "sync session committed"
        );
        Ok(summary)
    }

    fn negotiate(&self, scope: &str, setup_hash: SetupHash) -> SyncResult<EndpointId> {
        let last_known = self.store.applied_watermark(scope).unwrap_or(0);
        let request = NegotiateRequest::new(scope, self.config.endpoint, setup_hash, last_known);
        let response = self.transport.negotiate(&request)?;

        let hub_has_scope = response.hub_setup_hash != [0u8; 32];
        if hub_has_scope && response.hub_setup_hash != setup_hash {
            return Err(SyncError::SchemaDrift {
                scope: scope.to_string(),
                detail: "setup hash mismatch between ends".into(),
            });
        }
        if !response.accepted {
            return Err(SyncError::Rejected(
                response
                    .error
                    .unwrap_or_else(|| "negotiation rejected".into()),
            ));
        }
        Ok(response.hub_endpoint)
    }

    fn apply_incoming(
        &self,
        scope: &str,
        hub: &EndpointId,
        baseline: u64,
        batch: &Batch,
    ) -> SyncResult<(u64, u64)> {
        self.set_state(SessionState::ApplyingChanges);
        let plan = reconcile_batch(
            &*self.store,
            baseline,
            self.config.policy,
            SyncRole::Spoke,
            batch,
        )?;

        if !plan.conflicts.is_empty() {
            self.set_state(SessionState::ResolvingConflicts);
            tracing::debug!(
                scope,
                sequence = batch.sequence,
                conflicts = plan.conflicts.len(),
                escalations = plan.escalations,
                "resolved batch conflicts"
            );
            self.set_state(SessionState::ApplyingChanges);
        }

        // One transaction per batch: all surviving records or none.
        let receipt = self.store.apply(scope, hub, &plan.to_apply)?;
        Ok((receipt.applied, plan.conflict_count()))
    }
}
