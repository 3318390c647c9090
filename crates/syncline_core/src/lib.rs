//! # Syncline Core
//!
//! Store contracts and sync primitives for Syncline.
//!
//! This crate provides:
//! - The `VersionStore` / `ApplyStore` / `SchemaStore` contracts the
//!   engine and hub consume
//! - `MemoryStore`, the in-memory reference store with per-row change
//!   tracking, tombstones, and a retention floor
//! - The batch builder producing bounded, ordered change batches
//! - The scope registry owning per-(scope, endpoint) checkpoints
//! - The provisioning manager creating and tearing down sync metadata
//!
//! ## Key invariants
//!
//! - Row versions are node-local and monotonically increasing; applying
//!   a remote record stamps a fresh local version, never the remote one
//! - Checkpoints never decrease for a (scope, endpoint) pair and only
//!   advance through the registry's compare-and-swap commit
//! - Batch application is atomic: all records in a batch commit or none
//! - Checkpoints for distinct pairs are never serialized against each
//!   other

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod batch;
mod error;
mod memory;
mod provision;
mod reconcile;
mod registry;
mod store;

pub use batch::BatchBuilder;
pub use error::{CoreError, CoreResult};
pub use memory::MemoryStore;
pub use provision::{ProvisionOutcome, ProvisioningManager};
pub use reconcile::{reconcile_batch, ApplyPlan};
pub use registry::ScopeRegistry;
pub use store::{
    ApplyReceipt, ApplyStore, Checkpoint, RowMeta, SchemaStore, ScopeMeta, SyncStore, VersionStore,
};
