//! Batch production over a version store.

use crate::error::CoreResult;
use crate::store::VersionStore;
use std::collections::VecDeque;
use std::sync::Arc;
use syncline_protocol::{Batch, ChangeRecord, EndpointId, ScopeDef};

/// How a builder sources its rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BuildMode {
    /// Changes since a baseline version.
    Incremental { baseline: u64 },
    /// Every live row, for full reinitialization.
    Snapshot,
}

/// Produces the outgoing batch sequence for one session direction.
///
/// Tables are consumed in the scope's declared order (parents before
/// children) so referential integrity holds during apply on the other
/// end. Rows are pulled per table as needed; the builder never holds
/// more than one table's changes plus one packed batch.
///
/// The sequence is finite and restartable from scratch: constructing a
/// new builder over the same baseline reproduces the same batches.
///
/// The final batch across all tables is flagged `is_last`; a direction
/// with zero changes still emits a single empty `is_last` batch so the
/// wire protocol stays symmetric.
pub struct BatchBuilder<S> {
    store: Arc<S>,
    scope: ScopeDef,
    peer: EndpointId,
    mode: BuildMode,
    through: u64,
    max_rows: usize,
    table_index: usize,
    pending: VecDeque<ChangeRecord>,
    sequence: u64,
    emitted_last: bool,
}

impl<S: VersionStore> BatchBuilder<S> {
    /// Creates a builder over the changes since `baseline`, destined
    /// for `peer`.
    ///
    /// The store's current version is captured as the watermark: rows
    /// stamped after construction are not part of this session and
    /// will be picked up by the next one.
    pub fn incremental(
        store: Arc<S>,
        scope: ScopeDef,
        peer: EndpointId,
        baseline: u64,
        max_rows: usize,
    ) -> CoreResult<Self> {
        let through = store.current_version(&scope.name)?;
        Ok(Self {
            store,
            scope,
            peer,
            mode: BuildMode::Incremental { baseline },
            through,
            max_rows: max_rows.max(1),
            table_index: 0,
            pending: VecDeque::new(),
            sequence: 0,
            emitted_last: false,
        })
    }

    /// Creates a builder that re-seeds every live row as an insert.
    ///
    /// Used when tracked history is gone (`TrackingUnavailable`): the
    /// peer applies the snapshot upsert-style and both ends converge on
    /// live rows.
    pub fn snapshot(
        store: Arc<S>,
        scope: ScopeDef,
        peer: EndpointId,
        max_rows: usize,
    ) -> CoreResult<Self> {
        let through = store.current_version(&scope.name)?;
        Ok(Self {
            store,
            scope,
            peer,
            mode: BuildMode::Snapshot,
            through,
            max_rows: max_rows.max(1),
            table_index: 0,
            pending: VecDeque::new(),
            sequence: 0,
            emitted_last: false,
        })
    }

    /// Returns the version watermark this builder covers. Committing
    /// the checkpoint at this version after a successful session makes
    /// the next session resume exactly where this one left off.
    pub fn through_version(&self) -> u64 {
        self.through
    }

    /// Returns true once the `is_last` batch has been produced.
    pub fn finished(&self) -> bool {
        self.emitted_last
    }

    /// Produces the next batch, or `None` after the final one.
    pub fn next_batch(&mut self) -> CoreResult<Option<Batch>> {
        if self.emitted_last {
            return Ok(None);
        }

        // Pull table changes until we can fill a batch and still know
        // whether anything remains after it.
        while self.pending.len() <= self.max_rows && self.table_index < self.scope.tables.len() {
            let table = self.scope.tables[self.table_index].name.clone();
            let mut rows = match self.mode {
                BuildMode::Incremental { baseline } => {
                    self.store
                        .changes_since(&self.scope.name, &table, baseline, &self.peer)?
                }
                BuildMode::Snapshot => self.store.snapshot(&self.scope.name, &table)?,
            };
            // Rows stamped after the session watermark belong to the
            // next session.
            rows.retain(|r| r.version <= self.through);
            self.pending.extend(rows);
            self.table_index += 1;
        }

        let take = self.pending.len().min(self.max_rows);
        let records: Vec<ChangeRecord> = self.pending.drain(..take).collect();

        self.sequence += 1;
        let exhausted =
            self.pending.is_empty() && self.table_index == self.scope.tables.len();

        let batch = if exhausted {
            self.emitted_last = true;
            Batch::last(self.scope.name.clone(), self.sequence, records)
        } else {
            Batch::new(self.scope.name.clone(), self.sequence, records)
        };

        Ok(Some(batch))
    }
}
