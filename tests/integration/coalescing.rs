use super::support::{kv_over, ScriptedBackend};
use guardian_core::coalesce::LookupSource;
use guardian_core::config::SubscriptionConfig;
use guardian_core::storage::MemoryStorage;
use guardian_core::subscription::{Subscription, SubscriptionService, Usage};
use std::sync::Arc;
use std::time::Duration;

fn usage(percentage: f64, remaining: Option<i64>) -> Usage {
    Usage {
        requests_made: 10,
        requests_limit: Some(100),
        usage_percentage: percentage,
        remaining_requests: remaining,
        ..Usage::default()
    }
}

#[tokio::test(start_paused = true)]
async fn concurrent_lookups_share_one_fetch() {
    let backend = Arc::new(ScriptedBackend::new(
        Ok(Subscription::default()),
        Ok(usage(10.0, Some(90))),
    ));
    let service = SubscriptionService::new(backend.clone(), &SubscriptionConfig::default());

    let (first, second) = tokio::join!(service.get_usage(), service.get_usage());
    assert_eq!(backend.usage_calls(), 1);
    assert_eq!(first.value, second.value);
    assert_eq!(first.source, LookupSource::Fetched);

    let cached = service.get_usage().await;
    assert_eq!(cached.source, LookupSource::Cache);
    assert_eq!(backend.usage_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn expired_entry_is_fetched_again() {
    let backend = Arc::new(ScriptedBackend::new(
        Ok(Subscription::default()),
        Ok(usage(10.0, Some(90))),
    ));
    let config = SubscriptionConfig::default();
    let service = SubscriptionService::new(backend.clone(), &config);

    service.get_usage().await;
    tokio::time::advance(Duration::from_secs(config.cache_ttl_secs - 1)).await;
    service.get_usage().await;
    assert_eq!(backend.usage_calls(), 1);

    tokio::time::advance(Duration::from_secs(2)).await;
    let refreshed = service.get_usage().await;
    assert_eq!(refreshed.source, LookupSource::Fetched);
    assert_eq!(backend.usage_calls(), 2);
}

#[tokio::test]
async fn cached_lookups_survive_a_restart_through_session_storage() {
    let storage = Arc::new(MemoryStorage::new());
    let config = SubscriptionConfig::default();

    let backend = Arc::new(ScriptedBackend::new(
        Ok(Subscription::default()),
        Ok(usage(42.0, Some(58))),
    ));
    let first = SubscriptionService::load(backend.clone(), kv_over(&storage), &config).await;
    first.get_usage().await;
    drop(first);

    let restarted_backend = Arc::new(ScriptedBackend::new(
        Ok(Subscription::default()),
        Ok(usage(0.0, None)),
    ));
    let second =
        SubscriptionService::load(restarted_backend.clone(), kv_over(&storage), &config).await;

    let restored = second.get_usage().await;
    assert_eq!(restored.source, LookupSource::Cache);
    assert_eq!(restored.value.usage_percentage, 42.0);
    assert_eq!(restarted_backend.usage_calls(), 0);

    second.clear_cache().await;
    second.get_usage().await;
    assert_eq!(restarted_backend.usage_calls(), 1);
}
