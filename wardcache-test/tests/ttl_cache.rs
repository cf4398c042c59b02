use std::sync::Arc;
use std::time::Duration;

use wardcache::{CacheKey, CacheStats, TtlCache};
use wardcache_core::MockClock;

fn cache() -> (TtlCache, MockClock) {
    let clock = MockClock::new();
    (TtlCache::with_clock(Arc::new(clock.clone())), clock)
}

fn resident(id: &str) -> CacheKey {
    CacheKey::entity("residents", id)
}

#[test]
fn value_is_visible_until_ttl_elapses() {
    let (cache, clock) = cache();
    for ttl in [1, 30, 300] {
        let key = resident(&ttl.to_string());
        let ttl = Duration::from_secs(ttl);
        cache.set_as(key.clone(), &"Ada", ttl).unwrap();

        assert_eq!(cache.get_as::<String>(&key).as_deref(), Some("Ada"));
        clock.advance(ttl - Duration::from_millis(1));
        assert!(cache.contains(&key));
        clock.advance(Duration::from_millis(1));
        assert_eq!(cache.get_as::<String>(&key), None);
    }
    assert!(cache.is_empty());
}

#[test]
fn expired_read_removes_entry_from_stats() {
    let (cache, clock) = cache();
    cache.set_as(resident("a"), &1, Duration::from_secs(10)).unwrap();
    cache.set_as(resident("b"), &2, Duration::from_secs(60)).unwrap();

    clock.advance(Duration::from_secs(10));
    assert_eq!(cache.get_as::<u32>(&resident("a")), None);
    assert_eq!(
        cache.stats(),
        CacheStats {
            total: 1,
            valid: 1,
            expired: 0
        }
    );
}

#[test]
fn stats_sweeps_expired_entries() {
    let (cache, clock) = cache();
    cache.set_as(resident("a"), &1, Duration::from_secs(10)).unwrap();
    cache.set_as(resident("b"), &2, Duration::from_secs(60)).unwrap();
    clock.advance(Duration::from_secs(30));

    let stats = cache.stats();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.valid, 1);
    assert_eq!(stats.expired, 1);
    assert_eq!(cache.len(), 1);
}

#[test]
fn overwrite_resets_stored_at() {
    let (cache, clock) = cache();
    let key = resident("a");
    cache.set_as(key.clone(), &1, Duration::from_secs(10)).unwrap();
    clock.advance(Duration::from_secs(8));
    cache.set_as(key.clone(), &2, Duration::from_secs(10)).unwrap();
    clock.advance(Duration::from_secs(8));

    assert_eq!(cache.get_as::<u32>(&key), Some(2));
}

#[test]
fn prefix_invalidation_leaves_other_namespaces() {
    let (cache, _clock) = cache();
    let ttl = Duration::from_secs(60);
    cache.set_as(resident("a"), &1, ttl).unwrap();
    cache.set_as(resident("b"), &2, ttl).unwrap();
    cache.set_as(CacheKey::entity("staff", "s-1"), &3, ttl).unwrap();

    assert_eq!(cache.invalidate_prefix("residents"), 2);
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.get_as::<u32>(&CacheKey::entity("staff", "s-1")), Some(3));
}

#[test]
fn undecodable_entry_is_a_miss() {
    let (cache, _clock) = cache();
    let key = resident("a");
    cache
        .set_as(key.clone(), &"not a number", Duration::from_secs(60))
        .unwrap();

    assert_eq!(cache.get_as::<u32>(&key), None);
    assert!(!cache.contains(&key));
}

#[test]
fn global_cache_is_shared() {
    let key = CacheKey::entity("wardcache-test-global", "shared");
    TtlCache::global()
        .set_as(key.clone(), &42, Duration::from_secs(60))
        .unwrap();

    assert_eq!(TtlCache::global().get_as::<u32>(&key), Some(42));
    TtlCache::global().delete(&key);
}
