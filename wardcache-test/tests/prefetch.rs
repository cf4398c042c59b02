use std::sync::Arc;
use std::time::Duration;

use wardcache::offload::OffloadConfig;
use wardcache::policy::PrefetchPolicy;
use wardcache::{CacheKey, CacheService, Settings, TtlCache};
use wardcache_core::MockClock;
use wardcache_test::mock_producer::MockProducer;
use wardcache_test::tracing::create_span_collector;

fn service() -> CacheService {
    let settings = Settings::builder()
        .prefetch(PrefetchPolicy {
            delay: Duration::from_millis(500),
        })
        .build();
    CacheService::with_cache(
        Arc::new(TtlCache::with_clock(Arc::new(MockClock::new()))),
        settings,
    )
}

fn roster() -> CacheKey {
    CacheKey::entity("staff-roster", "ward-3")
}

#[tokio::test(start_paused = true)]
async fn prefetch_warms_cache_for_later_loads() {
    let service = service();
    let producer = MockProducer::ok(vec!["nurse-1".to_string(), "nurse-2".to_string()]);

    assert!(service.prefetcher().prefetch(roster(), producer.clone()));
    service.offload().wait_all().await;
    assert_eq!(producer.calls(), 1);

    let outcome = service
        .loader::<Vec<String>>()
        .load(roster(), producer.clone())
        .await;
    assert_eq!(outcome.value().map(Vec::len), Some(2));
    assert_eq!(producer.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn concurrent_prefetches_of_one_key_run_once() {
    let service = service();
    let producer = MockProducer::ok(1u32);
    let prefetcher = service.prefetcher();

    let accepted = (0..5)
        .filter(|_| prefetcher.prefetch(roster(), producer.clone()))
        .count();
    service.offload().wait_all().await;

    assert_eq!(accepted, 1);
    assert_eq!(producer.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_prefetch_is_silent() {
    let service = service();

    assert!(
        service
            .prefetcher()
            .prefetch(roster(), MockProducer::<u32>::failing("roster service down"))
    );
    service.offload().wait_all().await;

    assert!(service.cache().is_empty());
    assert_eq!(service.offload().active_task_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn slow_prefetch_is_cancelled_by_offload_timeout() {
    let settings = Settings::builder()
        .prefetch(PrefetchPolicy {
            delay: Duration::from_millis(100),
        })
        .offload(OffloadConfig::builder().timeout(Duration::from_secs(1)).build())
        .build();
    let service = CacheService::with_cache(
        Arc::new(TtlCache::with_clock(Arc::new(MockClock::new()))),
        settings,
    );
    let slow = MockProducer::ok(1u32).with_delay(Duration::from_secs(30));

    service.prefetcher().prefetch(roster(), slow.clone());
    service.offload().wait_all().await;

    assert_eq!(slow.calls(), 1);
    assert!(!service.cache().contains(&roster()));
}

#[tokio::test(start_paused = true)]
async fn prefetch_runs_in_offload_span() {
    let collector = create_span_collector();
    let _guard = collector.set_default();
    let service = service();

    service
        .prefetcher()
        .prefetch(roster(), MockProducer::ok(1u32));
    service.offload().wait_all().await;

    collector.assert_span_sequence(&["wardcache.prefetch", "offload_task"]);
}
