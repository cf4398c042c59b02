use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What happens to a background task that runs too long.
///
/// In YAML: `none`, `{ cancel: 30s }` or `{ warn: 5s }`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutPolicy {
    /// Task runs until completion.
    #[default]
    None,
    /// Task is dropped after the duration.
    Cancel(#[serde(with = "humantime_serde")] Duration),
    /// A warning is logged once the task completes late; the task is not
    /// interrupted.
    Warn(#[serde(with = "humantime_serde")] Duration),
}

fn default_deduplicate() -> bool {
    true
}

/// Configuration for the [`OffloadManager`](super::OffloadManager).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffloadConfig {
    /// Maximum number of tasks running at once; extra tasks wait for a
    /// slot. Unlimited when absent.
    #[serde(default)]
    pub max_concurrent_tasks: Option<usize>,
    /// Timeout policy for spawned tasks.
    #[serde(default)]
    pub timeout_policy: TimeoutPolicy,
    /// Skip a keyed task while another task with the same key is in flight.
    #[serde(default = "default_deduplicate")]
    pub deduplicate: bool,
}

impl Default for OffloadConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: None,
            timeout_policy: TimeoutPolicy::None,
            deduplicate: true,
        }
    }
}

impl OffloadConfig {
    /// Creates a builder starting from the defaults.
    pub fn builder() -> OffloadConfigBuilder {
        OffloadConfigBuilder::default()
    }
}

/// Builder for [`OffloadConfig`].
#[derive(Debug, Clone, Default)]
pub struct OffloadConfigBuilder {
    config: OffloadConfig,
}

impl OffloadConfigBuilder {
    /// Bounds the number of concurrently running tasks.
    pub fn max_concurrent_tasks(mut self, max: usize) -> Self {
        self.config.max_concurrent_tasks = Some(max);
        self
    }

    /// Sets the timeout policy.
    pub fn timeout_policy(mut self, policy: TimeoutPolicy) -> Self {
        self.config.timeout_policy = policy;
        self
    }

    /// Cancels tasks running longer than `duration`.
    pub fn timeout(self, duration: Duration) -> Self {
        self.timeout_policy(TimeoutPolicy::Cancel(duration))
    }

    /// Enables or disables deduplication of keyed tasks.
    pub fn deduplicate(mut self, enabled: bool) -> Self {
        self.config.deduplicate = enabled;
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> OffloadConfig {
        self.config
    }
}
