//! Registry tuning knobs.

use std::time::Duration;

use serde::{Deserialize, Serialize};

const DEFAULT_EVENT_CAPACITY: usize = 256;
const DEFAULT_NOTICE_CAPACITY: usize = 256;
const DEFAULT_PUBLISH_CONSUME_ANNOUNCE_DELAY_MS: u64 = 15_000;
const DEFAULT_CONSUME_ANNOUNCE_DELAY_MS: u64 = 30_000;
const DEFAULT_STALE_SWEEP_INTERVAL_MS: u64 = 30_000;
const DEFAULT_STALE_GRACE_MS: u64 = 10_000;

/// Registry configuration. All fields default, so a partial config file (or
/// none at all) yields a working broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// When false, every setup is admitted under a synthesized mock
    /// principal instead of bearer-token verification.
    pub auth_required: bool,
    /// Cluster group announced in topology-change events.
    pub cluster_group: String,
    /// Ring size of the lifecycle event topic.
    pub event_capacity: usize,
    /// Ring size of the operator-notice topic.
    pub notice_capacity: usize,
    /// Topology-announce delay for handlers that both publish and consume.
    pub publish_consume_announce_delay_ms: u64,
    /// Topology-announce delay for consume-only handlers.
    pub consume_announce_delay_ms: u64,
    /// How often the stale-handler sweeper runs.
    pub stale_sweep_interval_ms: u64,
    /// How long a closed socket may linger in the directory before the
    /// sweeper force-disposes its handler.
    pub stale_grace_ms: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            auth_required: true,
            cluster_group: "default".into(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
            notice_capacity: DEFAULT_NOTICE_CAPACITY,
            publish_consume_announce_delay_ms: DEFAULT_PUBLISH_CONSUME_ANNOUNCE_DELAY_MS,
            consume_announce_delay_ms: DEFAULT_CONSUME_ANNOUNCE_DELAY_MS,
            stale_sweep_interval_ms: DEFAULT_STALE_SWEEP_INTERVAL_MS,
            stale_grace_ms: DEFAULT_STALE_GRACE_MS,
        }
    }
}

impl RegistryConfig {
    pub fn publish_consume_announce_delay(&self) -> Duration {
        Duration::from_millis(self.publish_consume_announce_delay_ms)
    }

    pub fn consume_announce_delay(&self) -> Duration {
        Duration::from_millis(self.consume_announce_delay_ms)
    }

    pub fn stale_sweep_interval(&self) -> Duration {
        Duration::from_millis(self.stale_sweep_interval_ms)
    }

    pub fn stale_grace(&self) -> Duration {
        Duration::from_millis(self.stale_grace_ms)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_require_auth() {
        let config = RegistryConfig::default();
        assert!(config.auth_required);
        assert_eq!(config.cluster_group, "default");
        assert_eq!(config.consume_announce_delay(), Duration::from_secs(30));
    }

    #[test]
    fn partial_config_fills_defaults() {
        let config: RegistryConfig =
            serde_json::from_str(r#"{"auth_required": false, "event_capacity": 16}"#).unwrap();
        assert!(!config.auth_required);
        assert_eq!(config.event_capacity, 16);
        assert_eq!(
            config.publish_consume_announce_delay(),
            Duration::from_secs(15)
        );
    }
}
