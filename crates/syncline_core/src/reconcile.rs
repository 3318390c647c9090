//! Conflict detection and application planning for incoming batches.

use crate::error::CoreResult;
use crate::store::ApplyStore;
use syncline_protocol::{
    Batch, ChangeRecord, ConflictCase, ConflictPolicy, Resolution, SyncRole,
};

/// The outcome of planning one incoming batch against local state.
///
/// `to_apply` holds the records that survive conflict resolution, in
/// batch order; they are applied in a single transaction by the caller.
#[derive(Debug, Default)]
pub struct ApplyPlan {
    /// Records to apply, in order.
    pub to_apply: Vec<ChangeRecord>,
    /// Resolved conflict cases, for audit logging.
    pub conflicts: Vec<ConflictCase>,
    /// How many conflicts had no direct precedence for their operation
    /// kinds and fell back to the policy's generic rule.
    pub escalations: u64,
}

impl ApplyPlan {
    /// Returns the number of conflicts resolved while planning.
    pub fn conflict_count(&self) -> u64 {
        self.conflicts.len() as u64
    }
}

/// Plans the application of an incoming batch.
///
/// A record conflicts when its row was modified locally since
/// `baseline` and that modification was a genuine local write (rows
/// applied from the peer earlier in the session do not conflict with
/// the peer's own records). Each conflict is resolved deterministically
/// under `(policy, role)`:
///
/// - `AcceptRemote`: the incoming record is applied.
/// - `KeepLocal`: the incoming record is dropped; the winning local
///   state is already pending outward, so the remote adopts it through
///   the normal exchange.
///
/// Operation-kind pairs with no direct precedence (a delete against a
/// non-delete) are resolved by the same rule, treating the delete as a
/// row state like any other, and counted as escalations so the caller
/// can log them; they are never silently dropped.
pub fn reconcile_batch<S: ApplyStore>(
    store: &S,
    baseline: u64,
    policy: ConflictPolicy,
    role: SyncRole,
    batch: &Batch,
) -> CoreResult<ApplyPlan> {
    let mut plan = ApplyPlan::default();

    for record in &batch.records {
        let Some(meta) = store.row_meta(&record.table, &record.key)? else {
            plan.to_apply.push(record.clone());
            continue;
        };

        let locally_pending = meta.version > baseline && meta.is_local_change();
        if !locally_pending {
            plan.to_apply.push(record.clone());
            continue;
        }

        let local = if meta.deleted {
            ChangeRecord::delete(record.table.clone(), record.key.clone(), meta.version)
        } else {
            let (payload, version) = store
                .read_row(&record.table, &record.key)?
                .unwrap_or_default();
            ChangeRecord::update(record.table.clone(), record.key.clone(), version, payload)
        };

        let mut case = ConflictCase::new(local, record.clone());
        if case.requires_escalation() {
            plan.escalations += 1;
            tracing::warn!(
                table = %record.table,
                ?role,
                "no direct precedence for operation pair; deferring to policy side"
            );
        }

        let resolution = case.resolve(policy, role);
        if resolution == Resolution::AcceptRemote && !case.is_vacuous() {
            plan.to_apply.push(record.clone());
        }
        plan.conflicts.push(case);
    }

    Ok(plan)
}
