//! Per-(scope, endpoint) hub session state.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use syncline_core::{BatchBuilder, CoreError, CoreResult, SyncStore};
use syncline_protocol::{Batch, EndpointId, ScopeDef};

/// The hub-side state of one sync session.
///
/// Holds the session baseline and the hub's outgoing batch progress.
/// A session is created at negotiation, consumed batch by batch during
/// exchange, and removed at commit. Re-negotiating the same pair
/// replaces any stale session from an aborted attempt.
pub struct HubSession<S> {
    scope: ScopeDef,
    endpoint: EndpointId,
    store: Arc<S>,
    baseline: u64,
    expected: Option<u64>,
    builder: BatchBuilder<S>,
    max_rows: usize,
    reinitialized: bool,
    conflicts: u64,
    started: Instant,
}

impl<S: SyncStore> HubSession<S> {
    /// Creates a session for a pair, starting from its checkpoint.
    pub fn new(
        store: Arc<S>,
        scope: ScopeDef,
        endpoint: EndpointId,
        baseline: u64,
        expected: Option<u64>,
        max_rows: usize,
    ) -> CoreResult<Self> {
        let builder = BatchBuilder::incremental(
            Arc::clone(&store),
            scope.clone(),
            endpoint,
            baseline,
            max_rows,
        )?;
        Ok(Self {
            scope,
            endpoint,
            store,
            baseline,
            expected,
            builder,
            max_rows,
            reinitialized: false,
            conflicts: 0,
            started: Instant::now(),
        })
    }

    /// The session baseline (the pair's checkpoint at negotiation).
    pub fn baseline(&self) -> u64 {
        self.baseline
    }

    /// The checkpoint version expected at commit, for the
    /// compare-and-swap.
    pub fn expected(&self) -> Option<u64> {
        self.expected
    }

    /// The version watermark this session delivers.
    pub fn through_version(&self) -> u64 {
        self.builder.through_version()
    }

    /// When the session was negotiated.
    pub fn started(&self) -> Instant {
        self.started
    }

    /// True if the outgoing direction fell back to a snapshot.
    pub fn reinitialized(&self) -> bool {
        self.reinitialized
    }

    /// Conflicts resolved on the hub during this session.
    pub fn conflicts(&self) -> u64 {
        self.conflicts
    }

    /// Adds to the session's conflict counter.
    pub fn add_conflicts(&mut self, count: u64) {
        self.conflicts += count;
    }

    /// Produces the hub's next outgoing batch, or `None` once drained.
    ///
    /// When the pair's baseline precedes the retention floor the
    /// outgoing direction reinitializes: the builder is replaced with a
    /// snapshot builder and every live row is re-sent as an insert.
    pub fn next_outgoing(&mut self) -> CoreResult<Option<Batch>> {
        match self.builder.next_batch() {
            Ok(batch) => Ok(batch),
            Err(CoreError::TrackingUnavailable {
                table,
                requested,
                floor,
            }) => {
                tracing::warn!(
                    scope = %self.scope.name,
                    endpoint = %self.endpoint,
                    table = %table,
                    requested,
                    floor,
                    "hub history gone for pair; reinitializing from snapshot"
                );
                self.reinitialized = true;
                self.builder = BatchBuilder::snapshot(
                    Arc::clone(&self.store),
                    self.scope.clone(),
                    self.endpoint,
                    self.max_rows,
                )?;
                self.builder.next_batch()
            }
            Err(other) => Err(other),
        }
    }
}

/// The hub's session table, keyed by (scope, endpoint).
///
/// Each session sits behind its own mutex: applies for one pair are
/// strictly sequential, while sessions for distinct pairs proceed
/// concurrently. One slow spoke never serializes the others.
pub struct SessionRegistry<S> {
    sessions: Mutex<HashMap<(String, EndpointId), Arc<Mutex<HubSession<S>>>>>,
}

impl<S: SyncStore> SessionRegistry<S> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a session, replacing any stale one for the pair.
    pub fn insert(&self, scope: &str, endpoint: EndpointId, session: HubSession<S>) {
        self.sessions
            .lock()
            .insert((scope.to_string(), endpoint), Arc::new(Mutex::new(session)));
    }

    /// Returns the session for a pair, if active.
    pub fn get(&self, scope: &str, endpoint: &EndpointId) -> Option<Arc<Mutex<HubSession<S>>>> {
        self.sessions
            .lock()
            .get(&(scope.to_string(), *endpoint))
            .map(Arc::clone)
    }

    /// Removes and returns the session for a pair.
    pub fn remove(&self, scope: &str, endpoint: &EndpointId) -> Option<Arc<Mutex<HubSession<S>>>> {
        self.sessions.lock().remove(&(scope.to_string(), *endpoint))
    }

    /// Removes every session for a scope. Used at deprovision time.
    pub fn remove_scope(&self, scope: &str) {
        self.sessions
            .lock()
            .retain(|(session_scope, _), _| session_scope != scope);
    }

    /// Returns the number of active sessions.
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Returns true if no sessions are active.
    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}

impl<S: SyncStore> Default for SessionRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use syncline_core::{MemoryStore, SchemaStore};
    use syncline_protocol::{ColumnDef, ColumnType, RowKey, ScalarValue, TableDef};

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

    fn store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        let def = scope_def();
        let hash = def.setup_hash().unwrap();
        store.create_scope(&def, hash).unwrap();
        store
    }

    fn payload(qty: i64) -> BTreeMap<String, ScalarValue> {
        let mut map = BTreeMap::new();
        map.insert("qty".to_string(), qty.into());
        map
    }

    #[test]
    fn session_drains_outgoing_batches() {
        let store = store();
        for i in 0..3i64 {
            store.put_row("orders", RowKey::single(i), payload(i)).unwrap();
        }

        let mut session = HubSession::new(
            Arc::clone(&store),
            scope_def(),
            EndpointId::generate(),
            0,
            None,
            2,
        )
        .unwrap();

        let first = session.next_outgoing().unwrap().unwrap();
        assert_eq!(first.len(), 2);
        assert!(!first.is_last);

        let second = session.next_outgoing().unwrap().unwrap();
        assert_eq!(second.len(), 1);
        assert!(second.is_last);

        assert!(session.next_outgoing().unwrap().is_none());
    }

    #[test]
    fn stale_baseline_reinitializes() {
        let store = store();
        store.put_row("orders", RowKey::single(1i64), payload(1)).unwrap();
        let v2 = store.put_row("orders", RowKey::single(2i64), payload(2)).unwrap();
        store.gc_before(v2);

        // Baseline 0 now precedes the floor.
        let mut session = HubSession::new(
            Arc::clone(&store),
            scope_def(),
            EndpointId::generate(),
            0,
            None,
            10,
        )
        .unwrap();

        let batch = session.next_outgoing().unwrap().unwrap();
        assert!(session.reinitialized());
        assert_eq!(batch.len(), 2);
        assert!(batch.is_last);
    }

    #[test]
    fn registry_replaces_stale_sessions() {
        let store = store();
        let endpoint = EndpointId::generate();
        let registry = SessionRegistry::new();

        let make = || {
            HubSession::new(Arc::clone(&store), scope_def(), endpoint, 0, None, 10).unwrap()
        };

        registry.insert("sales", endpoint, make());
        registry.insert("sales", endpoint, make());
        assert_eq!(registry.len(), 1);

        assert!(registry.get("sales", &endpoint).is_some());
        assert!(registry.remove("sales", &endpoint).is_some());
        assert!(registry.is_empty());
    }

    #[test]
    fn remove_scope_clears_all_pairs() {
        let store = store();
        let registry = SessionRegistry::new();

        for _ in 0..3 {
            let endpoint = EndpointId::generate();
            let session =
                HubSession::new(Arc::clone(&store), scope_def(), endpoint, 0, None, 10).unwrap();
            registry.insert("sales", endpoint, session);
        }
        assert_eq!(registry.len(), 3);

        registry.remove_scope("sales");
        assert!(registry.is_empty());
    }
}
