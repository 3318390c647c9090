//! In-memory reference store with change tracking.

use crate::error::{CoreError, CoreResult};
use crate::store::{
    ApplyReceipt, ApplyStore, Checkpoint, RowMeta, SchemaStore, ScopeMeta, VersionStore,
};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use syncline_protocol::{ChangeRecord, EndpointId, RowKey, RowOp, ScalarValue, ScopeDef, SetupHash};

/// One tracked row, live or tombstoned.
#[derive(Debug, Clone)]
struct RowState {
    payload: BTreeMap<String, ScalarValue>,
    /// Version of the latest change.
    version: u64,
    /// Version at which the row was (last) created.
    created_version: u64,
    /// Endpoint the latest change was applied from; `None` for local
    /// writes.
    origin: Option<EndpointId>,
    /// True if the latest change was a delete.
    deleted: bool,
}

#[derive(Debug, Default)]
struct TableState {
    rows: BTreeMap<RowKey, RowState>,
}

#[derive(Default)]
struct StoreInner {
    tables: HashMap<String, TableState>,
    scopes: HashMap<String, ScopeMeta>,
    checkpoints: HashMap<(String, EndpointId), Checkpoint>,
    applied_watermarks: HashMap<String, u64>,
    /// Next change-tracking version to assign. Versions are store-global
    /// and start at 1.
    next_version: u64,
    /// Versions below this floor have had their tombstones reclaimed.
    retention_floor: u64,
}

impl StoreInner {
    fn stamp(&mut self) -> u64 {
        let version = self.next_version;
        self.next_version += 1;
        version
    }

    fn require_scope(&self, scope: &str) -> CoreResult<&ScopeMeta> {
        self.scopes
            .get(scope)
            .ok_or_else(|| CoreError::UnknownScope(scope.to_string()))
    }

    fn require_scope_table(&self, scope: &str, table: &str) -> CoreResult<()> {
        let meta = self.require_scope(scope)?;
        if !meta.def.contains_table(table) {
            return Err(CoreError::UnknownTable(table.to_string()));
        }
        Ok(())
    }
}

/// An in-memory relational store with per-row change tracking.
///
/// `MemoryStore` is the reference implementation of the store
/// contracts: a version counter stamps every row mutation, deletes
/// leave tombstones, and a retention floor models the tracking
/// garbage collection a production store performs on its own schedule.
///
/// Local (application) writes go through [`put_row`] / [`delete_row`];
/// synchronization applies go through [`ApplyStore::apply`], which
/// attributes the written rows to their originating endpoint so they
/// are not echoed back on the next session.
///
/// [`put_row`]: MemoryStore::put_row
/// [`delete_row`]: MemoryStore::delete_row
pub struct MemoryStore {
    inner: RwLock<StoreInner>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StoreInner {
                next_version: 1,
                ..StoreInner::default()
            }),
        }
    }

    /// Writes a row locally, stamping a fresh version.
    ///
    /// Returns the assigned version.
    pub fn put_row(
        &self,
        table: &str,
        key: RowKey,
        payload: BTreeMap<String, ScalarValue>,
    ) -> CoreResult<u64> {
        let mut inner = self.inner.write();
        if !inner.tables.contains_key(table) {
            return Err(CoreError::UnknownTable(table.to_string()));
        }

        let version = inner.stamp();
        let state = inner
            .tables
            .get_mut(table)
            .ok_or_else(|| CoreError::UnknownTable(table.to_string()))?;

        match state.rows.get_mut(&key) {
            Some(row) if !row.deleted => {
                row.payload = payload;
                row.version = version;
                row.origin = None;
            }
            Some(row) => {
                // Resurrect a tombstone: this is a new row as far as
                // change tracking is concerned.
                row.payload = payload;
                row.version = version;
                row.created_version = version;
                row.origin = None;
                row.deleted = false;
            }
            None => {
                state.rows.insert(
                    key,
                    RowState {
                        payload,
                        version,
                        created_version: version,
                        origin: None,
                        deleted: false,
                    },
                );
            }
        }

        Ok(version)
    }

    /// Deletes a row locally, leaving a tombstone.
    ///
    /// Returns the tombstone version, or `None` if the row did not
    /// exist.
    pub fn delete_row(&self, table: &str, key: &RowKey) -> CoreResult<Option<u64>> {
        let mut inner = self.inner.write();
        let has_live = inner
            .tables
            .get(table)
            .ok_or_else(|| CoreError::UnknownTable(table.to_string()))?
            .rows
            .get(key)
            .is_some_and(|row| !row.deleted);

        if !has_live {
            return Ok(None);
        }

        let version = inner.stamp();
        let state = inner
            .tables
            .get_mut(table)
            .ok_or_else(|| CoreError::UnknownTable(table.to_string()))?;

        if let Some(row) = state.rows.get_mut(key) {
            row.payload.clear();
            row.version = version;
            row.origin = None;
            row.deleted = true;
        }
        Ok(Some(version))
    }

    /// Raises the retention floor to `version` and reclaims tombstones
    /// older than it.
    ///
    /// Deltas can no longer be computed from baselines below the floor;
    /// sessions holding such baselines must reinitialize.
    pub fn gc_before(&self, version: u64) {
        let mut inner = self.inner.write();
        if version <= inner.retention_floor {
            return;
        }
        inner.retention_floor = version;
        for state in inner.tables.values_mut() {
            state
                .rows
                .retain(|_, row| !(row.deleted && row.version < version));
        }
    }

    /// Returns the current retention floor.
    pub fn retention_floor(&self) -> u64 {
        self.inner.read().retention_floor
    }

    /// Returns the number of live rows in a table.
    pub fn live_rows(&self, table: &str) -> CoreResult<usize> {
        let inner = self.inner.read();
        let state = inner
            .tables
            .get(table)
            .ok_or_else(|| CoreError::UnknownTable(table.to_string()))?;
        Ok(state.rows.values().filter(|r| !r.deleted).count())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn record_for(table: &str, key: &RowKey, row: &RowState, since: u64) -> ChangeRecord {
    if row.deleted {
        ChangeRecord::delete(table, key.clone(), row.version)
    } else if row.created_version > since {
        ChangeRecord::insert(table, key.clone(), row.version, row.payload.clone())
    } else {
        ChangeRecord::update(table, key.clone(), row.version, row.payload.clone())
    }
}

impl VersionStore for MemoryStore {
    fn current_version(&self, scope: &str) -> CoreResult<u64> {
        let inner = self.inner.read();
        inner.require_scope(scope)?;
        Ok(inner.next_version - 1)
    }

    fn changes_since(
        &self,
        scope: &str,
        table: &str,
        since_version: u64,
        for_endpoint: &EndpointId,
    ) -> CoreResult<Vec<ChangeRecord>> {
        let inner = self.inner.read();
        inner.require_scope_table(scope, table)?;

        if since_version < inner.retention_floor {
            return Err(CoreError::TrackingUnavailable {
                table: table.to_string(),
                requested: since_version,
                floor: inner.retention_floor,
            });
        }

        let state = inner
            .tables
            .get(table)
            .ok_or_else(|| CoreError::UnknownTable(table.to_string()))?;

        let mut changes: Vec<ChangeRecord> = state
            .rows
            .iter()
            .filter(|(_, row)| row.version > since_version)
            .filter(|(_, row)| row.origin.as_ref() != Some(for_endpoint))
            .filter(|(_, row)| !(row.deleted && row.created_version > since_version))
            .map(|(key, row)| record_for(table, key, row, since_version))
            .collect();

        changes.sort_by(|a, b| a.version.cmp(&b.version).then_with(|| a.key.cmp(&b.key)));
        Ok(changes)
    }

    fn snapshot(&self, scope: &str, table: &str) -> CoreResult<Vec<ChangeRecord>> {
        let inner = self.inner.read();
        inner.require_scope_table(scope, table)?;

        let state = inner
            .tables
            .get(table)
            .ok_or_else(|| CoreError::UnknownTable(table.to_string()))?;

        let mut rows: Vec<ChangeRecord> = state
            .rows
            .iter()
            .filter(|(_, row)| !row.deleted)
            .map(|(key, row)| {
                ChangeRecord::insert(table, key.clone(), row.version, row.payload.clone())
            })
            .collect();

        rows.sort_by(|a, b| a.version.cmp(&b.version).then_with(|| a.key.cmp(&b.key)));
        Ok(rows)
    }

    fn mark_applied(&self, scope: &str, version: u64) -> CoreResult<()> {
        let mut inner = self.inner.write();
        inner.require_scope(scope)?;
        let watermark = inner.applied_watermarks.entry(scope.to_string()).or_insert(0);
        *watermark = (*watermark).max(version);
        Ok(())
    }

    fn applied_watermark(&self, scope: &str) -> CoreResult<u64> {
        let inner = self.inner.read();
        inner.require_scope(scope)?;
        Ok(inner.applied_watermarks.get(scope).copied().unwrap_or(0))
    }
}

impl ApplyStore for MemoryStore {
    fn apply(
        &self,
        scope: &str,
        origin: &EndpointId,
        records: &[ChangeRecord],
    ) -> CoreResult<ApplyReceipt> {
        let mut inner = self.inner.write();

        // Validate the whole batch before touching any row so a bad
        // record cannot leave a partial application behind.
        for record in records {
            inner.require_scope_table(scope, &record.table)?;
            if !inner.tables.contains_key(&record.table) {
                return Err(CoreError::UnknownTable(record.table.clone()));
            }
        }

        let mut receipt = ApplyReceipt::default();

        for record in records {
            match record.op {
                RowOp::Insert | RowOp::Update => {
                    let version = inner.stamp();
                    let state = inner
                        .tables
                        .get_mut(&record.table)
                        .ok_or_else(|| CoreError::UnknownTable(record.table.clone()))?;

                    match state.rows.get_mut(&record.key) {
                        Some(row) if !row.deleted => {
                            row.payload = record.payload.clone();
                            row.version = version;
                            row.origin = Some(*origin);
                        }
                        Some(row) => {
                            row.payload = record.payload.clone();
                            row.version = version;
                            row.created_version = version;
                            row.origin = Some(*origin);
                            row.deleted = false;
                        }
                        None => {
                            state.rows.insert(
                                record.key.clone(),
                                RowState {
                                    payload: record.payload.clone(),
                                    version,
                                    created_version: version,
                                    origin: Some(*origin),
                                    deleted: false,
                                },
                            );
                        }
                    }

                    receipt.applied += 1;
                    receipt.first_version.get_or_insert(version);
                    receipt.last_version = Some(version);
                }
                RowOp::Delete => {
                    let has_live = inner
                        .tables
                        .get(&record.table)
                        .and_then(|state| state.rows.get(&record.key))
                        .is_some_and(|row| !row.deleted);

                    if !has_live {
                        receipt.skipped += 1;
                        continue;
                    }

                    let version = inner.stamp();
                    let state = inner
                        .tables
                        .get_mut(&record.table)
                        .ok_or_else(|| CoreError::UnknownTable(record.table.clone()))?;

                    if let Some(row) = state.rows.get_mut(&record.key) {
                        row.payload.clear();
                        row.version = version;
                        row.origin = Some(*origin);
                        row.deleted = true;
                    }

                    receipt.applied += 1;
                    receipt.first_version.get_or_insert(version);
                    receipt.last_version = Some(version);
                }
            }
        }

        Ok(receipt)
    }

    fn row_meta(&self, table: &str, key: &RowKey) -> CoreResult<Option<RowMeta>> {
        let inner = self.inner.read();
        let state = inner
            .tables
            .get(table)
            .ok_or_else(|| CoreError::UnknownTable(table.to_string()))?;

        Ok(state.rows.get(key).map(|row| RowMeta {
            version: row.version,
            origin: row.origin,
            deleted: row.deleted,
        }))
    }

    fn read_row(
        &self,
        table: &str,
        key: &RowKey,
    ) -> CoreResult<Option<(BTreeMap<String, ScalarValue>, u64)>> {
        let inner = self.inner.read();
        let state = inner
            .tables
            .get(table)
            .ok_or_else(|| CoreError::UnknownTable(table.to_string()))?;

        Ok(state
            .rows
            .get(key)
            .filter(|row| !row.deleted)
            .map(|row| (row.payload.clone(), row.version)))
    }
}

impl SchemaStore for MemoryStore {
    fn create_scope(&self, def: &ScopeDef, setup_hash: SetupHash) -> CoreResult<()> {
        let mut inner = self.inner.write();
        if inner.scopes.contains_key(&def.name) {
            return Err(CoreError::ScopeExists(def.name.clone()));
        }

        for table in &def.tables {
            inner.tables.entry(table.name.clone()).or_default();
        }

        inner.scopes.insert(
            def.name.clone(),
            ScopeMeta {
                def: def.clone(),
                setup_hash,
            },
        );
        Ok(())
    }

    fn scope_meta(&self, scope: &str) -> CoreResult<Option<ScopeMeta>> {
        Ok(self.inner.read().scopes.get(scope).cloned())
    }

    fn drop_scope(&self, scope: &str) -> CoreResult<()> {
        let mut inner = self.inner.write();
        let Some(meta) = inner.scopes.remove(scope) else {
            return Ok(());
        };

        inner
            .checkpoints
            .retain(|(checkpoint_scope, _), _| checkpoint_scope != scope);
        inner.applied_watermarks.remove(scope);

        // Drop tracking structures not shared with another scope.
        for table in meta.def.table_names() {
            let shared = inner
                .scopes
                .values()
                .any(|other| other.def.contains_table(table));
            if !shared {
                inner.tables.remove(table);
            }
        }
        Ok(())
    }

    fn checkpoint(&self, scope: &str, endpoint: &EndpointId) -> CoreResult<Option<Checkpoint>> {
        let inner = self.inner.read();
        inner.require_scope(scope)?;
        Ok(inner
            .checkpoints
            .get(&(scope.to_string(), *endpoint))
            .cloned())
    }

    fn commit_checkpoint(
        &self,
        scope: &str,
        endpoint: &EndpointId,
        expected: Option<u64>,
        checkpoint: Checkpoint,
    ) -> CoreResult<()> {
        let mut inner = self.inner.write();
        inner.require_scope(scope)?;

        let key = (scope.to_string(), *endpoint);
        let current = inner
            .checkpoints
            .get(&key)
            .map(|c| c.last_sync_version);

        if current != expected {
            return Err(CoreError::CheckpointRace {
                scope: scope.to_string(),
                expected: expected.unwrap_or(0),
                actual: current.unwrap_or(0),
            });
        }

        if let Some(current_version) = current {
            if checkpoint.last_sync_version < current_version {
                return Err(CoreError::CheckpointRace {
                    scope: scope.to_string(),
                    expected: checkpoint.last_sync_version,
                    actual: current_version,
                });
            }
        }

        inner.checkpoints.insert(key, checkpoint);
        Ok(())
    }
}
