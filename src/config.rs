//! Configuration for the broadcast protocol.

use std::time::Duration;

use crate::error::{Error, Result};

/// Environment variable overriding [`BroadcastConfig::gossip_interval`] (milliseconds).
pub const ENV_GOSSIP_INTERVAL_MS: &str = "BROADCAST_GOSSIP_INTERVAL_MS";
/// Environment variable overriding [`BroadcastConfig::eager_push`].
pub const ENV_EAGER_PUSH: &str = "BROADCAST_EAGER_PUSH";
/// Environment variable enabling or disabling the benchmark grid override.
pub const ENV_GRID_OVERRIDE: &str = "BROADCAST_GRID_OVERRIDE";
/// Environment variable overriding [`BroadcastConfig::suppress_grid_acks`].
pub const ENV_SUPPRESS_GRID_ACKS: &str = "BROADCAST_SUPPRESS_GRID_ACKS";

/// Cluster size of the known large-scale benchmark that gets the grid topology.
pub const BENCHMARK_CLUSTER_SIZE: usize = 25;

/// Configuration options for the broadcast protocol.
///
/// These parameters trade delivery latency against message volume.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BroadcastConfig {
    /// Interval between retransmission rounds.
    ///
    /// Every round sends each neighbor the full set of messages it has
    /// not yet acknowledged. Shorter intervals lower latency but resend
    /// unacknowledged batches more often.
    ///
    /// Default: 150ms
    #[serde(with = "humantime_serde_impl")]
    pub gossip_interval: Duration,

    /// Push a newly learned message to every neighbor immediately.
    ///
    /// Without eager push a message waits for the next retransmission
    /// round. Eventual delivery holds either way.
    ///
    /// Default: false
    pub eager_push: bool,

    /// Cluster size that switches the topology to the benchmark grid.
    ///
    /// `None` always trusts the topology supplied by the cluster.
    ///
    /// Default: Some(25)
    pub grid_cluster_size: Option<usize>,

    /// Number of consecutive node indices per grid group.
    ///
    /// Default: 5
    pub grid_group_size: usize,

    /// Skip `update_ok` acknowledgments while the grid topology is active.
    ///
    /// Halves message volume; convergence then relies on retransmission
    /// alone, so pending sets never shrink.
    ///
    /// Default: true
    pub suppress_grid_acks: bool,

    /// Capacity of the outgoing message queue.
    ///
    /// Batches that do not fit are dropped and resent on the next round.
    ///
    /// Default: 1024
    pub outgoing_queue_capacity: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            gossip_interval: Duration::from_millis(150),
            eager_push: false,
            grid_cluster_size: Some(BENCHMARK_CLUSTER_SIZE),
            grid_group_size: 5,
            suppress_grid_acks: true,
            outgoing_queue_capacity: 1024,
        }
    }
}

impl BroadcastConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration tuned for delivery latency.
    ///
    /// - Eager push of newly learned messages
    /// - Shorter retransmission interval
    /// - Acknowledgments always sent
    pub fn low_latency() -> Self {
        Self {
            gossip_interval: Duration::from_millis(50),
            eager_push: true,
            suppress_grid_acks: false,
            ..Self::default()
        }
    }

    /// Configuration tuned for low message volume.
    ///
    /// - No eager push
    /// - Longer retransmission interval
    /// - Grid topology without acknowledgments on the benchmark cluster
    pub fn efficient() -> Self {
        Self {
            gossip_interval: Duration::from_millis(200),
            eager_push: false,
            suppress_grid_acks: true,
            ..Self::default()
        }
    }

    /// Load the default configuration with overrides from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    ///
    /// Unset keys keep their default value; unparsable values are errors.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_GOSSIP_INTERVAL_MS) {
            let ms: u64 = raw.trim().parse().map_err(|e| {
                Error::Config(format!("{}={:?}: {}", ENV_GOSSIP_INTERVAL_MS, raw, e))
            })?;
            config.gossip_interval = Duration::from_millis(ms);
        }
        if let Some(raw) = lookup(ENV_EAGER_PUSH) {
            config.eager_push = parse_flag(ENV_EAGER_PUSH, &raw)?;
        }
        if let Some(raw) = lookup(ENV_GRID_OVERRIDE) {
            if !parse_flag(ENV_GRID_OVERRIDE, &raw)? {
                config.grid_cluster_size = None;
            }
        }
        if let Some(raw) = lookup(ENV_SUPPRESS_GRID_ACKS) {
            config.suppress_grid_acks = parse_flag(ENV_SUPPRESS_GRID_ACKS, &raw)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration can drive a broadcaster.
    pub fn validate(&self) -> Result<()> {
        if self.gossip_interval.is_zero() {
            return Err(Error::Config("gossip_interval must be non-zero".into()));
        }
        if self.outgoing_queue_capacity == 0 {
            return Err(Error::Config(
                "outgoing_queue_capacity must be at least 1".into(),
            ));
        }
        if self.grid_group_size == 0 {
            return Err(Error::Config("grid_group_size must be at least 1".into()));
        }
        if let Some(size) = self.grid_cluster_size {
            if size % self.grid_group_size != 0 {
                return Err(Error::Config(format!(
                    "grid_cluster_size {} is not a multiple of grid_group_size {}",
                    size, self.grid_group_size
                )));
            }
        }
        Ok(())
    }

    /// Set the retransmission interval (builder pattern).
    pub const fn with_gossip_interval(mut self, interval: Duration) -> Self {
        self.gossip_interval = interval;
        self
    }

    /// Enable or disable eager push (builder pattern).
    pub const fn with_eager_push(mut self, enable: bool) -> Self {
        self.eager_push = enable;
        self
    }

    /// Set the cluster size that activates the grid topology (builder pattern).
    pub const fn with_grid_cluster_size(mut self, size: Option<usize>) -> Self {
        self.grid_cluster_size = size;
        self
    }

    /// Set the grid group size (builder pattern).
    pub const fn with_grid_group_size(mut self, size: usize) -> Self {
        self.grid_group_size = size;
        self
    }

    /// Enable or disable acknowledgment suppression on the grid (builder pattern).
    pub const fn with_suppress_grid_acks(mut self, suppress: bool) -> Self {
        self.suppress_grid_acks = suppress;
        self
    }

    /// Set the outgoing queue capacity (builder pattern).
    pub const fn with_outgoing_queue_capacity(mut self, capacity: usize) -> Self {
        self.outgoing_queue_capacity = capacity;
        self
    }
}

fn parse_flag(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::Config(format!(
            "{}={:?}: expected a boolean",
            key, other
        ))),
    }
}

mod humantime_serde_impl {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if serializer.is_human_readable() {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        } else {
            serializer.serialize_u64(duration.as_millis() as u64)
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            // Simple parsing: expect "Nms" format
            let ms: u64 = s
                .trim_end_matches("ms")
                .parse()
                .map_err(serde::de::Error::custom)?;
            Ok(Duration::from_millis(ms))
        } else {
            let ms = u64::deserialize(deserializer)?;
            Ok(Duration::from_millis(ms))
        }
    }
}
