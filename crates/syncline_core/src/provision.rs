//! Scope provisioning and deprovisioning.

use crate::error::{CoreError, CoreResult};
use crate::store::SchemaStore;
use std::sync::Arc;
use syncline_protocol::ScopeDef;

/// The outcome of a provisioning call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionOutcome {
    /// The scope's metadata and tracking structures were created.
    Provisioned,
    /// The scope was already provisioned with the same setup hash;
    /// nothing was touched.
    AlreadyProvisioned,
}

/// Creates and destroys the metadata a scope needs before sessions can
/// run against it.
///
/// Provisioning runs once at startup per node, not per sync session.
/// It is idempotent via the setup hash: re-provisioning with an
/// unchanged hash is a no-op, while a changed hash is refused so live
/// tracking metadata is never torn down implicitly. The operator must
/// deprovision and provision again to change a scope's shape.
pub struct ProvisioningManager<S> {
    store: Arc<S>,
}

impl<S: SchemaStore> ProvisioningManager<S> {
    /// Creates a provisioning manager over the given store.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Provisions a scope, idempotently.
    pub fn provision(&self, def: &ScopeDef) -> CoreResult<ProvisionOutcome> {
        let setup_hash = def.setup_hash()?;

        match self.store.scope_meta(&def.name)? {
            Some(meta) if meta.setup_hash == setup_hash => {
                tracing::debug!(scope = %def.name, "scope already provisioned");
                Ok(ProvisionOutcome::AlreadyProvisioned)
            }
            Some(_) => Err(CoreError::SetupHashMismatch {
                scope: def.name.clone(),
            }),
            None => {
                self.store.create_scope(def, setup_hash)?;
                tracing::info!(
                    scope = %def.name,
                    tables = def.tables.len(),
                    "scope provisioned"
                );
                Ok(ProvisionOutcome::Provisioned)
            }
        }
    }

    /// Deprovisions a scope: tracking metadata, scope record, and
    /// checkpoints are removed. Deprovisioning an absent scope is a
    /// no-op.
    pub fn deprovision(&self, scope: &str) -> CoreResult<()> {
        self.store.drop_scope(scope)?;
        tracing::info!(scope, "scope deprovisioned");
        Ok(())
    }
}
