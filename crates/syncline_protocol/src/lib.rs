//! # Syncline Protocol
//!
//! Protocol types and CBOR codecs for Syncline.
//!
//! This crate provides:
//! - Row-level change records and bounded change batches
//! - Scope and table definitions with setup-hash fingerprints
//! - Conflict cases and deterministic resolution policies
//! - The negotiate / exchange / commit message set
//!
//! ## Wire format
//!
//! All messages are encoded as CBOR maps via serde. The encoding is
//! self-describing; unknown fields are rejected on decode so that
//! protocol drift surfaces as an error rather than silent data loss.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod conflict;
mod endpoint;
mod error;
mod messages;
mod record;
mod schema;
mod value;
mod wire;

pub use conflict::{ConflictCase, ConflictPolicy, Resolution, SyncRole};
pub use endpoint::EndpointId;
pub use error::{ProtocolError, ProtocolResult};
pub use messages::{
    CommitRequest, CommitResponse, ExchangeRequest, ExchangeResponse, NegotiateRequest,
    NegotiateResponse, SyncMessage, COMMIT_PATH, EXCHANGE_PATH, NEGOTIATE_PATH, PROTOCOL_VERSION,
};
pub use record::{Batch, ChangeRecord, RowOp};
pub use schema::{ColumnDef, ColumnType, ScopeDef, SetupHash, TableDef};
pub use value::{RowKey, ScalarValue};
pub use wire::{decode, encode};
