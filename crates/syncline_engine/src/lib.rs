//! # Syncline Engine
//!
//! Sync session state machine and orchestration for Syncline.
//!
//! This crate provides:
//! - The session state machine (negotiate → pull baseline → exchange →
//!   apply → resolve → commit)
//! - Session-level retry with a fixed attempt budget
//! - Full reinitialization when tracked history is gone
//! - Transport abstraction with mock and loopback implementations
//! - Configuration with an immutable JSON snapshot loader
//!
//! ## Architecture
//!
//! Sessions are spoke-initiated and bidirectional: every exchange
//! round-trip carries one outgoing batch and can return one incoming
//! batch, so both directions drain batch by batch. Incoming batches are
//! applied in one transaction each; conflicts are resolved during apply
//! under the configured policy.
//!
//! ## Key invariants
//!
//! - The checkpoint advances exactly once per session, and only after
//!   every batch in both directions has been applied and committed
//! - A session that faults leaves the checkpoint untouched; retrying it
//!   is idempotent because batch application is upsert-shaped
//! - Retry happens at session granularity only, with a fixed attempt
//!   budget and a fixed inter-attempt delay
//! - Sessions for distinct (scope, endpoint) pairs never serialize
//!   against each other

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod loopback;
mod orchestrator;
mod session;
mod transport;

pub use config::{ConfigSnapshot, RetryConfig, SyncConfig};
pub use error::{SyncError, SyncResult};
pub use loopback::{LoopbackServer, LoopbackTransport};
pub use orchestrator::SyncOrchestrator;
pub use session::{EngineStats, SessionState, SessionSummary};
pub use transport::{MockTransport, SyncTransport};
