use std::sync::Arc;
use std::time::Duration;

use wardcache::fetch::SessionStatus;
use wardcache::policy::LoaderPolicy;
use wardcache::{
    CacheKey, CacheService, KeyedLoader, LoadError, LoadOutcome, LoadState, Settings, TtlCache,
};
use wardcache_core::MockClock;
use wardcache_test::mock_producer::{GatedProducer, MockProducer};

fn isolated_cache() -> Arc<TtlCache> {
    Arc::new(TtlCache::with_clock(Arc::new(MockClock::new())))
}

fn loader(cache: &Arc<TtlCache>) -> Arc<KeyedLoader<String>> {
    Arc::new(KeyedLoader::new(Arc::clone(cache), LoaderPolicy::default()))
}

fn care_plan() -> CacheKey {
    CacheKey::entity("care-plans", "r-1")
}

async fn wait_until_loading(loader: &KeyedLoader<String>) {
    loader
        .subscribe()
        .wait_for(LoadState::is_loading)
        .await
        .unwrap();
}

#[tokio::test]
async fn superseded_load_never_publishes() {
    let cache = isolated_cache();
    let loader = loader(&cache);
    let (first, gate) = GatedProducer::new();

    let pending = tokio::spawn({
        let loader = Arc::clone(&loader);
        async move { loader.load(care_plan(), first).await }
    });
    wait_until_loading(&loader).await;

    let second = loader.load(care_plan(), MockProducer::ok("B".to_string())).await;
    assert!(matches!(second, LoadOutcome::Fetched(ref value) if value == "B"));
    assert!(matches!(pending.await.unwrap(), LoadOutcome::Cancelled));

    assert_eq!(gate.calls(), 1);
    assert!(gate.is_abandoned());
    assert!(!gate.release("A".to_string()));

    assert_eq!(loader.state().value().map(String::as_str), Some("B"));
    assert_eq!(cache.get_as::<String>(&care_plan()).as_deref(), Some("B"));
}

#[tokio::test]
async fn cancel_returns_to_idle_and_caches_nothing() {
    let cache = isolated_cache();
    let loader = loader(&cache);
    let (producer, gate) = GatedProducer::new();

    let pending = tokio::spawn({
        let loader = Arc::clone(&loader);
        async move { loader.load(care_plan(), producer).await }
    });
    wait_until_loading(&loader).await;

    assert!(loader.cancel());
    assert!(matches!(loader.state(), LoadState::Idle));
    assert!(matches!(pending.await.unwrap(), LoadOutcome::Cancelled));
    assert!(!gate.release("late".to_string()));

    assert!(matches!(loader.state(), LoadState::Idle));
    assert!(!cache.contains(&care_plan()));
    assert!(!loader.cancel());
}

#[tokio::test(start_paused = true)]
async fn dropped_load_future_abandons_session() {
    let cache = isolated_cache();
    let loader = loader(&cache);
    let (producer, gate) = GatedProducer::new();

    let timed_out =
        tokio::time::timeout(Duration::from_millis(10), loader.load(care_plan(), producer)).await;
    assert!(timed_out.is_err());

    let session = loader.session().unwrap();
    assert!(session.is_cancelled());
    assert_eq!(session.status(), SessionStatus::Cancelled);
    assert!(matches!(loader.state(), LoadState::Idle));
    assert!(gate.is_abandoned());
    assert!(!cache.contains(&care_plan()));
}

#[tokio::test]
async fn dropping_loader_cancels_its_session() {
    let cache = isolated_cache();
    let loader = loader(&cache);

    loader
        .load(care_plan(), MockProducer::ok("A".to_string()))
        .await;
    let session = loader.session().unwrap();
    assert!(!session.is_cancelled());

    drop(loader);
    assert!(session.is_cancelled());
    assert_eq!(cache.get_as::<String>(&care_plan()).as_deref(), Some("A"));
}

#[tokio::test]
async fn cached_value_skips_the_producer() {
    let cache = isolated_cache();
    let producer = MockProducer::ok("plan".to_string());

    let first = loader(&cache).load(care_plan(), producer.clone()).await;
    let second = loader(&cache).load(care_plan(), producer.clone()).await;

    assert!(matches!(first, LoadOutcome::Fetched(_)));
    assert!(matches!(second, LoadOutcome::Hit(_)));
    assert_eq!(producer.calls(), 1);
}

#[tokio::test]
async fn refetch_retries_after_failure() {
    let cache = isolated_cache();
    let loader = loader(&cache);

    let failed = loader
        .load(care_plan(), MockProducer::<String>::failing("503"))
        .await;
    assert!(matches!(failed, LoadOutcome::Failed(LoadError::Upstream(_))));
    assert!(matches!(loader.state(), LoadState::Error(_)));
    assert!(!cache.contains(&care_plan()));

    let retried = loader.refetch().await;
    assert!(matches!(retried, LoadOutcome::Failed(_)));
}

#[tokio::test(start_paused = true)]
async fn timeout_is_an_ordinary_failure() {
    let cache = isolated_cache();
    let policy = LoaderPolicy::builder()
        .timeout(Duration::from_secs(2))
        .build();
    let loader: KeyedLoader<String> = KeyedLoader::new(Arc::clone(&cache), policy);
    let slow = MockProducer::ok("slow".to_string()).with_delay(Duration::from_secs(5));

    let outcome = loader.load(care_plan(), slow).await;

    match outcome {
        LoadOutcome::Failed(error) => assert!(error.is_timeout()),
        other => panic!("expected timeout, got {other:?}"),
    }
    assert!(!cache.contains(&care_plan()));
}

fn coalescing_service() -> CacheService {
    let settings = Settings::builder()
        .loader(LoaderPolicy::builder().coalesce(true).build())
        .build();
    CacheService::with_cache(isolated_cache(), settings)
}

#[tokio::test]
async fn coalesced_loaders_share_one_fetch() {
    let service = coalescing_service();
    let leader = Arc::new(service.loader::<String>());
    let follower = Arc::new(service.loader::<String>());
    let (producer, gate) = GatedProducer::new();
    let unused = MockProducer::ok("own".to_string());

    let leading = tokio::spawn({
        let leader = Arc::clone(&leader);
        async move { leader.load(care_plan(), producer).await }
    });
    wait_until_loading(&leader).await;

    let following = tokio::spawn({
        let follower = Arc::clone(&follower);
        let unused = unused.clone();
        async move { follower.load(care_plan(), unused).await }
    });
    wait_until_loading(&follower).await;

    assert!(gate.release("shared".to_string()));
    let leading = leading.await.unwrap();
    let following = following.await.unwrap();

    assert_eq!(leading.into_value().as_deref(), Some("shared"));
    assert_eq!(following.into_value().as_deref(), Some("shared"));
    assert_eq!(unused.calls(), 0);
}

#[tokio::test]
async fn follower_fetches_itself_when_leader_is_cancelled() {
    let service = coalescing_service();
    let leader = Arc::new(service.loader::<String>());
    let follower = Arc::new(service.loader::<String>());
    let (producer, _gate) = GatedProducer::new();
    let fallback = MockProducer::ok("own".to_string());

    let leading = tokio::spawn({
        let leader = Arc::clone(&leader);
        async move { leader.load(care_plan(), producer).await }
    });
    wait_until_loading(&leader).await;

    let following = tokio::spawn({
        let follower = Arc::clone(&follower);
        let fallback = fallback.clone();
        async move { follower.load(care_plan(), fallback).await }
    });
    wait_until_loading(&follower).await;

    assert!(leader.cancel());
    assert!(matches!(leading.await.unwrap(), LoadOutcome::Cancelled));
    let following = following.await.unwrap();

    assert_eq!(following.into_value().as_deref(), Some("own"));
    assert_eq!(fallback.calls(), 1);
}
