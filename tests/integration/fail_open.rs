use super::support::ScriptedBackend;
use guardian_core::coalesce::LookupSource;
use guardian_core::config::SubscriptionConfig;
use guardian_core::error::FetchError;
use guardian_core::subscription::{DenyReason, Subscription, SubscriptionService, Usage};
use std::sync::Arc;

fn service_with(
    subscription: Result<Subscription, FetchError>,
    usage: Result<Usage, FetchError>,
) -> (Arc<ScriptedBackend>, SubscriptionService) {
    let backend = Arc::new(ScriptedBackend::new(subscription, usage));
    let service = SubscriptionService::new(backend.clone(), &SubscriptionConfig::default());
    (backend, service)
}

#[tokio::test]
async fn failing_subscription_fetch_still_allows() {
    let (backend, service) = service_with(
        Err(FetchError::Transport("connection refused".to_string())),
        Ok(Usage::default()),
    );

    let decision = service.can_make_request().await;
    assert!(decision.allowed);
    assert!(decision.error);
    assert_eq!(decision.subscription.tier, "free");
    assert_eq!(backend.usage_calls(), 0);

    // Failures are not cached
    service.can_make_request().await;
    assert_eq!(backend.subscription_calls(), 2);
}

#[tokio::test]
async fn unauthorized_is_distinguishable_but_fails_open() {
    let (_backend, service) = service_with(Err(FetchError::Unauthorized), Ok(Usage::default()));

    let lookup = service.get_current_subscription().await;
    assert_eq!(lookup.source, LookupSource::Unauthorized);
    assert_eq!(lookup.value, Subscription::default());
    assert!(service.can_make_request().await.allowed);
}

#[tokio::test]
async fn missing_record_maps_to_defaults() {
    let (_backend, service) = service_with(Err(FetchError::NotFound), Err(FetchError::NotFound));

    let lookup = service.get_usage().await;
    assert_eq!(lookup.source, LookupSource::NotFound);
    assert!(!lookup.is_error());
    assert_eq!(lookup.value.requests_limit, None);
    assert_eq!(lookup.value.usage_percentage, 0.0);

    let decision = service.can_make_request().await;
    assert!(decision.allowed);
    assert!(!decision.error);
    assert!(!decision.warning);
}

#[tokio::test]
async fn inactive_and_exhausted_subscriptions_are_denied() {
    let expired = Subscription {
        status: "expired".to_string(),
        ..Subscription::default()
    };
    let (_backend, service) = service_with(Ok(expired), Ok(Usage::default()));
    let decision = service.can_make_request().await;
    assert!(!decision.allowed);
    assert_eq!(decision.reason, Some(DenyReason::SubscriptionInactive));
    assert!(decision.message.unwrap().contains("expired"));

    let exhausted = Usage {
        remaining_requests: Some(0),
        usage_percentage: 100.0,
        ..Usage::default()
    };
    let (_backend, service) = service_with(Ok(Subscription::default()), Ok(exhausted));
    let decision = service.can_make_request().await;
    assert!(!decision.allowed);
    assert_eq!(decision.reason, Some(DenyReason::UsageLimitExceeded));
}

#[tokio::test]
async fn high_usage_warns_and_top_tier_skips_usage() {
    let busy = Usage {
        usage_percentage: 85.0,
        remaining_requests: Some(15),
        ..Usage::default()
    };
    let (_backend, service) = service_with(Ok(Subscription::default()), Ok(busy));
    let decision = service.can_make_request().await;
    assert!(decision.allowed);
    assert!(decision.warning);
    assert_eq!(
        decision.message.as_deref(),
        Some("You've used 85.0% of your monthly limit (15 remaining).")
    );

    let enterprise = Subscription {
        tier: "enterprise".to_string(),
        ..Subscription::default()
    };
    let (backend, service) = service_with(
        Ok(enterprise),
        Err(FetchError::Transport("unreachable".to_string())),
    );
    let decision = service.can_make_request().await;
    assert!(decision.allowed);
    assert!(!decision.warning);
    assert_eq!(backend.usage_calls(), 0);
}
