use std::sync::Arc;

use wardcache_core::system_clock;

use crate::batch::BatchResolver;
use crate::cache::TtlCache;
use crate::concurrency::{BroadcastConcurrencyManager, SharedResult};
use crate::config::Settings;
use crate::loader::{KeyedLoader, Loadable};
use crate::offload::OffloadManager;
use crate::prefetch::Prefetcher;

/// Wires the cache, background tasks and coalescing from one [`Settings`].
///
/// Loaders, prefetchers and batch resolvers handed out by the same service
/// share its cache. Clones share everything.
#[derive(Debug, Clone)]
pub struct CacheService {
    cache: Arc<TtlCache>,
    offload: OffloadManager,
    concurrency: Arc<BroadcastConcurrencyManager<SharedResult>>,
    settings: Settings,
}

impl CacheService {
    /// Creates a service with its own cache on the system clock.
    pub fn new(settings: Settings) -> Self {
        let cache = TtlCache::with_policy(settings.cache.clone(), system_clock());
        Self::with_cache(Arc::new(cache), settings)
    }

    /// Creates a service over an existing cache, e.g. [`TtlCache::global`]
    /// or a cache driven by a mock clock.
    ///
    /// The cache keeps its own policy; `settings.cache` is not applied.
    pub fn with_cache(cache: Arc<TtlCache>, settings: Settings) -> Self {
        Self {
            cache,
            offload: OffloadManager::new(settings.offload.clone()),
            concurrency: Arc::new(BroadcastConcurrencyManager::new()),
            settings,
        }
    }

    /// The shared cache.
    pub fn cache(&self) -> &Arc<TtlCache> {
        &self.cache
    }

    /// The background task manager.
    pub fn offload(&self) -> &OffloadManager {
        &self.offload
    }

    /// The service settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Creates a loader with the service's loader policy.
    ///
    /// With `coalesce` enabled, loaders of this service share in-flight
    /// fetches of the same key.
    pub fn loader<T: Loadable>(&self) -> KeyedLoader<T> {
        let loader = KeyedLoader::new(Arc::clone(&self.cache), self.settings.loader.clone());
        if self.settings.loader.coalesce {
            loader.with_concurrency_manager(self.concurrency.clone())
        } else {
            loader
        }
    }

    /// Creates a prefetcher on the service's task manager.
    pub fn prefetcher(&self) -> Prefetcher {
        Prefetcher::new(
            Arc::clone(&self.cache),
            self.offload.clone(),
            self.settings.prefetch.clone(),
        )
    }

    /// Creates a batch resolver for the `kind` of lookup, with the service's
    /// batch policy.
    pub fn batch_resolver(&self, kind: &str) -> BatchResolver {
        BatchResolver::new(Arc::clone(&self.cache), self.settings.batch.clone(), kind)
    }
}

impl Default for CacheService {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{CachePolicy, LoaderPolicy};
    use std::time::Duration;
    use wardcache_core::{BoxError, CacheKey, CancellationToken};

    #[tokio::test]
    async fn test_components_share_the_cache() {
        let service = CacheService::default();
        let loader = service.loader::<String>();
        let key = CacheKey::entity("residents", "r-1");

        loader
            .load(key.clone(), |_token: CancellationToken| async {
                Ok::<_, BoxError>("Ada".to_string())
            })
            .await;

        let other = service.clone().loader::<String>();
        assert!(
            other
                .load(key, |_token: CancellationToken| async {
                    Err::<String, BoxError>("not called".into())
                })
                .await
                .value()
                .is_some_and(|name| name == "Ada")
        );
    }

    #[test]
    fn test_new_applies_cache_policy() {
        let settings = Settings::builder()
            .cache(CachePolicy::builder().default_ttl(Duration::from_secs(9)).build())
            .loader(LoaderPolicy::builder().coalesce(true).build())
            .build();
        let service = CacheService::new(settings);

        assert_eq!(service.cache().policy().default_ttl, Duration::from_secs(9));
        assert_eq!(service.loader::<u32>().ttl(), Duration::from_secs(9));
        assert_eq!(service.batch_resolver("care-plans").policy().concurrency.get(), 8);
    }
}
