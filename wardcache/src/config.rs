//! Top-level settings.
//!
//! [`Settings`] groups every policy the crate reads. Hosts usually build it
//! in code with [`Settings::builder`], or load it from YAML:
//!
//! ```
//! use std::time::Duration;
//! use wardcache::Settings;
//!
//! let settings = Settings::from_yaml(
//!     r#"
//! cache:
//!   default_ttl: 10m
//! batch:
//!   concurrency: 4
//! "#,
//! )
//! .unwrap();
//!
//! assert_eq!(settings.cache.default_ttl, Duration::from_secs(600));
//! assert_eq!(settings.batch.concurrency.get(), 4);
//! assert!(!settings.loader.coalesce);
//! ```
//!
//! Missing sections and fields fall back to their defaults.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::offload::OffloadConfig;
use crate::policy::{BatchPolicy, CachePolicy, LoaderPolicy, PrefetchPolicy};

/// Settings for a [`CacheService`](crate::CacheService).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// TTL cache settings.
    #[serde(default)]
    pub cache: CachePolicy,
    /// Defaults for loaders created by the service.
    #[serde(default)]
    pub loader: LoaderPolicy,
    /// Batch resolution settings.
    #[serde(default)]
    pub batch: BatchPolicy,
    /// Prefetch settings.
    #[serde(default)]
    pub prefetch: PrefetchPolicy,
    /// Background task settings.
    #[serde(default)]
    pub offload: OffloadConfig,
}

impl Settings {
    /// Creates a builder starting from the defaults.
    pub fn builder() -> SettingsBuilder {
        SettingsBuilder::default()
    }

    /// Parses settings from a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        serde_saphyr::from_str(yaml).map_err(|error| ConfigError::Parse(error.to_string()))
    }
}

/// Builder for [`Settings`].
#[derive(Debug, Clone, Default)]
pub struct SettingsBuilder {
    settings: Settings,
}

impl SettingsBuilder {
    /// Sets the cache policy.
    pub fn cache(mut self, policy: CachePolicy) -> Self {
        self.settings.cache = policy;
        self
    }

    /// Sets the default loader policy.
    pub fn loader(mut self, policy: LoaderPolicy) -> Self {
        self.settings.loader = policy;
        self
    }

    /// Sets the batch policy.
    pub fn batch(mut self, policy: BatchPolicy) -> Self {
        self.settings.batch = policy;
        self
    }

    /// Sets the prefetch policy.
    pub fn prefetch(mut self, policy: PrefetchPolicy) -> Self {
        self.settings.prefetch = policy;
        self
    }

    /// Sets the background task configuration.
    pub fn offload(mut self, config: OffloadConfig) -> Self {
        self.settings.offload = config;
        self
    }

    /// Builds the settings.
    pub fn build(self) -> Settings {
        self.settings
    }
}
