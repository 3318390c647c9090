//! # Syncline Server
//!
//! Hub-side sync session handling for Syncline.
//!
//! This crate provides:
//! - Request handlers for the negotiate / exchange / commit endpoints
//! - Per-(scope, endpoint) session state with per-pair serialization
//! - Hub-side conflict resolution and checkpoint commits
//! - A facade dispatching typed messages or raw CBOR frames
//!
//! # Architecture
//!
//! The hub serves any store implementing the core contracts and holds
//! one session per connected (scope, endpoint) pair. Sessions for
//! distinct pairs proceed concurrently; within one pair, batch
//! application is strictly sequential, which is the only serialization
//! point.
//!
//! The crate carries no transport: a deployment mounts
//! [`SyncServer::handle_frame`] on whatever request/response channel it
//! already has, and tests drive it through the engine's loopback
//! transport.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod handler;
mod server;
mod session;

pub use config::HubConfig;
pub use error::{ServerError, ServerResult};
pub use handler::{HubContext, RequestHandler};
pub use server::SyncServer;
pub use session::{HubSession, SessionRegistry};
