//! Hub configuration.

use syncline_protocol::{ConflictPolicy, PROTOCOL_VERSION};

/// Configuration for the hub.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Conflict policy applied when spoke batches collide with hub
    /// changes.
    pub policy: ConflictPolicy,
    /// Maximum rows accepted in one uploaded batch, and packed into one
    /// reply batch.
    pub max_batch_rows: usize,
    /// Protocol version the hub speaks.
    pub protocol_version: u16,
}

impl HubConfig {
    /// Creates a configuration with defaults.
    pub fn new() -> Self {
        Self {
            policy: ConflictPolicy::ServerWins,
            max_batch_rows: 100,
            protocol_version: PROTOCOL_VERSION,
        }
    }

    /// Sets the conflict policy.
    pub fn with_policy(mut self, policy: ConflictPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the batch row limit.
    pub fn with_max_batch_rows(mut self, rows: usize) -> Self {
        self.max_batch_rows = rows.max(1);
        self
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = HubConfig::default();
        assert_eq!(config.policy, ConflictPolicy::ServerWins);
        assert_eq!(config.max_batch_rows, 100);
        assert_eq!(config.protocol_version, PROTOCOL_VERSION);
    }

    #[test]
    fn builder() {
        let config = HubConfig::new()
            .with_policy(ConflictPolicy::ClientWins)
            .with_max_batch_rows(0);

        assert_eq!(config.policy, ConflictPolicy::ClientWins);
        // The limit never drops below one row.
        assert_eq!(config.max_batch_rows, 1);
    }
}
