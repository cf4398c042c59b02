use std::time::Duration;

use wardcache::offload::TimeoutPolicy;
use wardcache::{CacheService, ConfigError, Settings};

const PORTAL_SETTINGS: &str = r#"
cache:
  default_ttl: 5m
  status_ttl: 2m
loader:
  timeout: 15s
  coalesce: true
batch:
  concurrency: 8
prefetch:
  delay: 1s
offload:
  max_concurrent_tasks: 16
  timeout_policy:
    warn: 30s
"#;

#[test]
fn portal_settings_parse() {
    let settings = Settings::from_yaml(PORTAL_SETTINGS).unwrap();

    assert_eq!(settings.cache.default_ttl, Duration::from_secs(300));
    assert_eq!(settings.cache.status_ttl, Duration::from_secs(120));
    assert_eq!(settings.cache.max_entries, None);
    assert_eq!(settings.loader.timeout, Some(Duration::from_secs(15)));
    assert!(settings.loader.coalesce);
    assert_eq!(settings.batch.concurrency.get(), 8);
    assert_eq!(settings.batch.ttl, None);
    assert_eq!(settings.prefetch.delay, Duration::from_secs(1));
    assert_eq!(settings.offload.max_concurrent_tasks, Some(16));
    assert_eq!(
        settings.offload.timeout_policy,
        TimeoutPolicy::Warn(Duration::from_secs(30))
    );
    assert!(settings.offload.deduplicate);
}

#[test]
fn defaults_match_an_empty_document() {
    assert_eq!(Settings::from_yaml("{}").unwrap(), Settings::default());
}

#[test]
fn invalid_duration_is_a_parse_error() {
    let result = Settings::from_yaml("cache:\n  default_ttl: soon\n");
    assert!(matches!(result, Err(ConfigError::Parse(_))));
}

#[test]
fn service_uses_parsed_settings() {
    let service = CacheService::new(Settings::from_yaml(PORTAL_SETTINGS).unwrap());

    assert_eq!(service.cache().policy().status_ttl, Duration::from_secs(120));
    assert_eq!(service.offload().config().max_concurrent_tasks, Some(16));
    assert_eq!(service.loader::<u32>().ttl(), Duration::from_secs(300));
}
