//! Checkpoint ownership per (scope, endpoint) pair.

use crate::error::{CoreError, CoreResult};
use crate::store::{Checkpoint, SchemaStore};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use syncline_protocol::EndpointId;

/// Tracks, per (scope, endpoint) pair, the last successfully
/// synchronized version.
///
/// The registry is the sole mutator of checkpoints. Commits take a
/// per-pair lock, never a registry-wide one, so sessions for unrelated
/// endpoints are not serialized against each other; the store's
/// compare-and-swap backs the lock up across processes.
pub struct ScopeRegistry<S> {
    store: Arc<S>,
    pair_locks: Mutex<HashMap<(String, EndpointId), Arc<Mutex<()>>>>,
}

impl<S: SchemaStore> ScopeRegistry<S> {
    /// Creates a registry over the given store.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            pair_locks: Mutex::new(HashMap::new()),
        }
    }

    fn pair_lock(&self, scope: &str, endpoint: &EndpointId) -> Arc<Mutex<()>> {
        let mut locks = self.pair_locks.lock();
        Arc::clone(
            locks
                .entry((scope.to_string(), *endpoint))
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    /// Returns the checkpoint for a pair, if one has been committed.
    pub fn checkpoint(
        &self,
        scope: &str,
        endpoint: &EndpointId,
    ) -> CoreResult<Option<Checkpoint>> {
        self.store.checkpoint(scope, endpoint)
    }

    /// Returns the baseline version for a new session: the committed
    /// checkpoint, or zero when none exists (first sync).
    pub fn baseline(&self, scope: &str, endpoint: &EndpointId) -> CoreResult<u64> {
        Ok(self
            .store
            .checkpoint(scope, endpoint)?
            .map(|c| c.last_sync_version)
            .unwrap_or(0))
    }

    /// Commits a new checkpoint for a pair.
    ///
    /// Must be called only after the corresponding apply transaction
    /// has committed. `expected` is the baseline the session started
    /// from; a concurrent commit for the same pair surfaces as
    /// `CheckpointRace` and the losing session retries in full against
    /// the new checkpoint.
    pub fn commit(
        &self,
        scope: &str,
        endpoint: &EndpointId,
        expected: Option<u64>,
        version: u64,
        elapsed: Duration,
    ) -> CoreResult<Checkpoint> {
        let lock = self.pair_lock(scope, endpoint);
        let _guard = lock.lock();

        if let Some(expected_version) = expected {
            if version < expected_version {
                return Err(CoreError::CheckpointRace {
                    scope: scope.to_string(),
                    expected: version,
                    actual: expected_version,
                });
            }
        }

        let checkpoint = Checkpoint::new(version, elapsed);
        self.store
            .commit_checkpoint(scope, endpoint, expected, checkpoint.clone())?;

        tracing::debug!(
            scope,
            endpoint = %endpoint,
            version,
            "checkpoint committed"
        );
        Ok(checkpoint)
    }
}
