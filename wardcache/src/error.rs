use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use wardcache_core::BoxError;

/// Error surfaced to a loader's consumer when a fetch fails.
///
/// Load errors are never cached: the next `load` or `refetch` retries.
/// The type is `Clone` so it can sit in observable state and be shared with
/// coalesced followers.
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    /// The producer returned an error (network failure, non-2xx status, ...).
    #[error("upstream fetch failed: {0}")]
    Upstream(Arc<dyn std::error::Error + Send + Sync>),

    /// The producer did not finish within the configured timeout.
    #[error("upstream fetch timed out after {0:?}")]
    Timeout(Duration),

    /// A value shared between coalesced loaders could not cross the JSON
    /// boundary.
    #[error("failed to encode shared value: {0}")]
    Encode(Arc<serde_json::Error>),
}

impl LoadError {
    /// Converts a producer error.
    ///
    /// A `LoadError` that travelled through a producer (e.g. one shared by a
    /// coalesced fetch) is unwrapped instead of being nested.
    pub fn from_boxed(err: BoxError) -> Self {
        match err.downcast::<LoadError>() {
            Ok(load) => *load,
            Err(other) => LoadError::Upstream(Arc::from(other)),
        }
    }

    /// Returns `true` for timeouts.
    pub fn is_timeout(&self) -> bool {
        matches!(self, LoadError::Timeout(_))
    }
}

/// Error type for typed cache access.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The value could not be encoded into the cache's JSON representation.
    #[error("failed to encode cache value: {0}")]
    Encode(#[source] serde_json::Error),

    /// A cached JSON value did not decode into the requested type.
    #[error("failed to decode cache value: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Error type for loading [`Settings`](crate::config::Settings).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The YAML document could not be parsed into settings.
    #[error("invalid wardcache settings: {0}")]
    Parse(String),
}
