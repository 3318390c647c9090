//! Engine configuration.
//!
//! Configuration is consumed as an immutable snapshot per process
//! lifetime: scope definitions, conflict policy, batch size, and the
//! command timeout are fixed at startup. There is no hot reload.

use crate::error::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use syncline_protocol::{ConflictPolicy, EndpointId, ScopeDef};

/// Configuration for the sync engine.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// This node's endpoint identity.
    pub endpoint: EndpointId,
    /// Conflict policy applied on this node.
    pub policy: ConflictPolicy,
    /// Maximum rows packed into one batch.
    pub max_rows_per_batch: usize,
    /// Per-attempt session timeout.
    pub session_timeout: Duration,
    /// Session-level retry behavior.
    pub retry: RetryConfig,
    /// The scopes this node synchronizes.
    pub scopes: Vec<ScopeDef>,
}

impl SyncConfig {
    /// Creates a configuration with defaults for the given endpoint.
    pub fn new(endpoint: EndpointId) -> Self {
        Self {
            endpoint,
            policy: ConflictPolicy::ServerWins,
            max_rows_per_batch: 100,
            session_timeout: Duration::from_secs(30),
            retry: RetryConfig::default(),
            scopes: Vec::new(),
        }
    }

    /// Sets the conflict policy.
    pub fn with_policy(mut self, policy: ConflictPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the maximum rows per batch.
    pub fn with_max_rows_per_batch(mut self, rows: usize) -> Self {
        self.max_rows_per_batch = rows;
        self
    }

    /// Sets the per-attempt session timeout.
    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Adds a scope definition.
    pub fn with_scope(mut self, scope: ScopeDef) -> Self {
        self.scopes.push(scope);
        self
    }

    /// Returns the definition of a scope, if configured.
    pub fn scope(&self, name: &str) -> Option<&ScopeDef> {
        self.scopes.iter().find(|s| s.name == name)
    }

    /// Parses a configuration snapshot from JSON.
    pub fn from_json(json: &str) -> SyncResult<Self> {
        ConfigSnapshot::from_json(json).map(ConfigSnapshot::into_config)
    }
}

/// Session-level retry behavior.
///
/// Retry is deliberately simple: a fixed attempt budget with a fixed
/// inter-attempt delay, applied to the whole session. The checkpoint
/// has not moved when a session is retried, so the rerun is idempotent;
/// per-batch retry would require proving per-batch idempotence
/// independently and is not attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum session attempts, including the first.
    pub max_attempts: u32,
    /// Fixed delay between attempts.
    pub delay: Duration,
}

impl RetryConfig {
    /// Creates a retry configuration with the given attempt budget.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay: Duration::from_millis(500),
        }
    }

    /// Creates a configuration that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            delay: Duration::ZERO,
        }
    }

    /// Sets the inter-attempt delay.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}

/// The serialized form of a configuration snapshot.
///
/// Loaded once at process start; durations are carried in
/// milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    /// This node's endpoint identity. Generated when absent, for nodes
    /// that have not persisted one yet.
    #[serde(default)]
    pub endpoint: Option<EndpointId>,
    /// Conflict policy.
    pub policy: ConflictPolicy,
    /// Maximum rows per batch.
    pub max_rows_per_batch: usize,
    /// Per-attempt session timeout in milliseconds.
    pub session_timeout_ms: u64,
    /// Session attempt budget.
    pub retry_attempts: u32,
    /// Fixed inter-attempt delay in milliseconds.
    pub retry_delay_ms: u64,
    /// Scope definitions.
    pub scopes: Vec<ScopeDef>,
}

impl ConfigSnapshot {
    /// Parses a snapshot from JSON.
    pub fn from_json(json: &str) -> SyncResult<Self> {
        serde_json::from_str(json).map_err(|e| SyncError::Protocol(e.to_string()))
    }

    /// Converts the snapshot into an engine configuration.
    pub fn into_config(self) -> SyncConfig {
        SyncConfig {
            endpoint: self.endpoint.unwrap_or_else(EndpointId::generate),
            policy: self.policy,
            max_rows_per_batch: self.max_rows_per_batch.max(1),
            session_timeout: Duration::from_millis(self.session_timeout_ms),
            retry: RetryConfig {
                max_attempts: self.retry_attempts.max(1),
                delay: Duration::from_millis(self.retry_delay_ms),
            },
            scopes: self.scopes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syncline_protocol::{ColumnDef, ColumnType, TableDef};

    #[test]
    fn builder_defaults() {
        let endpoint = EndpointId::generate();
        let config = SyncConfig::new(endpoint)
            .with_policy(ConflictPolicy::ClientWins)
            .with_max_rows_per_batch(50)
            .with_session_timeout(Duration::from_secs(60));

        assert_eq!(config.endpoint, endpoint);
        assert_eq!(config.policy, ConflictPolicy::ClientWins);
        assert_eq!(config.max_rows_per_batch, 50);
        assert_eq!(config.session_timeout, Duration::from_secs(60));
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn scope_lookup() {
        let scope = ScopeDef::new(
            "sales",
            vec![TableDef::new(
                "orders",
                vec![ColumnDef::new("id", ColumnType::Integer)],
                vec!["id".into()],
            )],
        );
        let config = SyncConfig::new(EndpointId::generate()).with_scope(scope);

        assert!(config.scope("sales").is_some());
        assert!(config.scope("inventory").is_none());
    }

    #[test]
    fn no_retry_means_one_attempt() {
        let retry = RetryConfig::no_retry();
        assert_eq!(retry.max_attempts, 1);
        assert_eq!(retry.delay, Duration::ZERO);
    }

    #[test]
    fn snapshot_from_json() {
        let json = r#"{
            "policy": "ClientWins",
            "max_rows_per_batch": 200,
            "session_timeout_ms": 45000,
            "retry_attempts": 5,
            "retry_delay_ms": 250,
            "scopes": [{
                "name": "sales",
                "tables": [{
                    "name": "orders",
                    "columns": [{"name": "id", "ty": "Integer"}],
                    "key_columns": ["id"]
                }]
            }]
        }"#;

        let config = SyncConfig::from_json(json).unwrap();
        assert_eq!(config.policy, ConflictPolicy::ClientWins);
        assert_eq!(config.max_rows_per_batch, 200);
        assert_eq!(config.session_timeout, Duration::from_millis(45_000));
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.delay, Duration::from_millis(250));
        assert_eq!(config.scopes.len(), 1);
        assert!(config.scope("sales").is_some());
    }

    #[test]
    fn snapshot_rejects_malformed_json() {
        assert!(SyncConfig::from_json("{not json").is_err());
    }
}
