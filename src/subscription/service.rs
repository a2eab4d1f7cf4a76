//! Subscription service: coalesced lookups and the request admission policy.
//!
//! Lookups fail open. Any backend failure yields the free-tier / zero-usage
//! defaults, and `can_make_request` allows the request while flagging that
//! the subscription could not be verified.

use crate::coalesce::{Coalescer, Lookup};
use crate::config::SubscriptionConfig;
use crate::storage::KvMutator;
use crate::subscription::backend::SubscriptionBackend;
use crate::subscription::types::{Subscription, Usage};
use crate::types::StorageArea;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const SUBSCRIPTION_SLOT: &str = "subscription";
const USAGE_SLOT: &str = "usage";

/// Why a request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    SubscriptionInactive,
    UsageLimitExceeded,
}

/// Outcome of the admission check.
#[derive(Debug, Clone, Serialize)]
pub struct RequestDecision {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenyReason>,
    /// Allowed, but the caller should surface `message`
    pub warning: bool,
    /// Allowed because verification itself failed
    pub error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub subscription: Subscription,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl RequestDecision {
    fn allow(subscription: Subscription, usage: Option<Usage>) -> Self {
        Self {
            allowed: true,
            reason: None,
            warning: false,
            error: false,
            message: None,
            subscription,
            usage,
        }
    }

    fn deny(
        reason: DenyReason,
        message: String,
        subscription: Subscription,
        usage: Option<Usage>,
    ) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
            warning: false,
            error: false,
            message: Some(message),
            subscription,
            usage,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedLookup {
    value: Value,
    /// Wall-clock fetch time, milliseconds since the epoch
    fetched_at: i64,
}

pub struct SubscriptionService {
    backend: Arc<dyn SubscriptionBackend>,
    subscriptions: Coalescer<Subscription>,
    usage: Coalescer<Usage>,
    kv: Option<KvMutator>,
    cache_key: String,
    unlimited_tier: String,
    warning_threshold: f64,
}

impl SubscriptionService {
    /// Service without a persisted cache.
    pub fn new(backend: Arc<dyn SubscriptionBackend>, config: &SubscriptionConfig) -> Self {
        let ttl = Duration::from_secs(config.cache_ttl_secs);
        Self {
            backend,
            subscriptions: Coalescer::new(ttl),
            usage: Coalescer::new(ttl),
            kv: None,
            cache_key: config.cache_key.clone(),
            unlimited_tier: config.unlimited_tier.clone(),
            warning_threshold: config.warning_threshold,
        }
    }

    /// Service whose cache is mirrored to `session` storage and restored here.
    ///
    /// Entries older than the TTL are discarded while restoring.
    pub async fn load(
        backend: Arc<dyn SubscriptionBackend>,
        kv: KvMutator,
        config: &SubscriptionConfig,
    ) -> Self {
        let mut service = Self::new(backend, config);
        let persisted = match kv.read(&service.cache_key, StorageArea::Session).await {
            Ok(Some(Value::Object(map))) => map,
            Ok(_) => serde_json::Map::new(),
            Err(e) => {
                warn!(key = %service.cache_key, error = %e, "Failed to read subscription cache");
                serde_json::Map::new()
            }
        };

        let now_ms = Utc::now().timestamp_millis();
        if let Some((value, age)) =
            restore::<Subscription>(persisted.get(SUBSCRIPTION_SLOT), now_ms)
        {
            if service.subscriptions.seed(SUBSCRIPTION_SLOT, value, age) {
                info!("Restored cached subscription");
            }
        }
        if let Some((value, age)) = restore::<Usage>(persisted.get(USAGE_SLOT), now_ms) {
            if service.usage.seed(USAGE_SLOT, value, age) {
                info!("Restored cached usage");
            }
        }

        service.kv = Some(kv);
        service
    }

    /// Current subscription; the free tier if it cannot be fetched.
    pub async fn get_current_subscription(&self) -> Lookup<Subscription> {
        let backend = Arc::clone(&self.backend);
        let kv = self.kv.clone();
        let cache_key = self.cache_key.clone();
        self.subscriptions
            .get(
                SUBSCRIPTION_SLOT,
                move || async move {
                    let subscription = backend.fetch_subscription().await?;
                    persist(kv.as_ref(), &cache_key, SUBSCRIPTION_SLOT, &subscription).await;
                    Ok(subscription)
                },
                Subscription::default,
            )
            .await
    }

    /// Current usage; zero usage if it cannot be fetched.
    pub async fn get_usage(&self) -> Lookup<Usage> {
        let backend = Arc::clone(&self.backend);
        let kv = self.kv.clone();
        let cache_key = self.cache_key.clone();
        self.usage
            .get(
                USAGE_SLOT,
                move || async move {
                    let usage = backend.fetch_usage().await?;
                    persist(kv.as_ref(), &cache_key, USAGE_SLOT, &usage).await;
                    Ok(usage)
                },
                Usage::default,
            )
            .await
    }

    /// Decide whether the caller may issue another analysis request.
    pub async fn can_make_request(&self) -> RequestDecision {
        let lookup = self.get_current_subscription().await;
        if lookup.is_error() {
            warn!(error = ?lookup.error, "Unable to verify subscription, allowing request");
            return RequestDecision {
                error: true,
                message: Some("Unable to verify subscription status. Request allowed.".to_string()),
                ..RequestDecision::allow(lookup.value, None)
            };
        }
        let subscription = lookup.value;

        if !subscription.is_active() {
            warn!(status = %subscription.status, "Subscription not active");
            let message = match subscription.status.as_str() {
                "expired" => {
                    "Your subscription has expired. Please renew to continue using the service."
                }
                "cancelled" => {
                    "Your subscription has been cancelled. Please reactivate to continue."
                }
                _ => "Your subscription is not active. Please check your subscription status.",
            };
            return RequestDecision::deny(
                DenyReason::SubscriptionInactive,
                message.to_string(),
                subscription,
                None,
            );
        }

        if subscription.tier == self.unlimited_tier {
            return RequestDecision::allow(subscription, None);
        }

        let usage_lookup = self.get_usage().await;
        if usage_lookup.is_error() {
            warn!(error = ?usage_lookup.error, "Usage check failed, allowing request");
            return RequestDecision {
                warning: true,
                message: Some("Unable to verify usage limits. Request allowed.".to_string()),
                ..RequestDecision::allow(subscription, None)
            };
        }
        let usage = usage_lookup.value;

        if matches!(usage.remaining_requests, Some(remaining) if remaining <= 0) {
            warn!("Usage limit exceeded");
            return RequestDecision::deny(
                DenyReason::UsageLimitExceeded,
                "You have reached your usage limit for this billing period. Please upgrade or wait for the next billing cycle.".to_string(),
                subscription,
                Some(usage),
            );
        }

        if usage.usage_percentage >= self.warning_threshold {
            warn!(usage_percentage = usage.usage_percentage, "Approaching usage limit");
            let remaining = usage
                .remaining_requests
                .map(|r| r.to_string())
                .unwrap_or_else(|| "unlimited".to_string());
            let message = format!(
                "You've used {:.1}% of your monthly limit ({} remaining).",
                usage.usage_percentage, remaining
            );
            return RequestDecision {
                warning: true,
                message: Some(message),
                ..RequestDecision::allow(subscription, Some(usage))
            };
        }

        RequestDecision::allow(subscription, Some(usage))
    }

    /// Forget cached subscription and usage, in memory and in `session` storage.
    pub async fn clear_cache(&self) {
        self.subscriptions.clear();
        self.usage.clear();
        if let Some(kv) = &self.kv {
            if let Err(e) = kv
                .update_storage(&self.cache_key, |_| json!({}), StorageArea::Session)
                .await
            {
                warn!(
                    key = %self.cache_key,
                    error = %e,
                    "Failed to clear persisted subscription cache"
                );
            }
        }
        info!("Subscription cache cleared");
    }
}

fn restore<T: DeserializeOwned>(entry: Option<&Value>, now_ms: i64) -> Option<(T, Duration)> {
    let entry: PersistedLookup = serde_json::from_value(entry?.clone()).ok()?;
    let value = serde_json::from_value(entry.value).ok()?;
    let age_ms = u64::try_from(now_ms.saturating_sub(entry.fetched_at)).unwrap_or(0);
    Some((value, Duration::from_millis(age_ms)))
}

async fn persist<T: Serialize>(kv: Option<&KvMutator>, cache_key: &str, slot: &str, value: &T) {
    let Some(kv) = kv else {
        return;
    };
    let value = match serde_json::to_value(value) {
        Ok(value) => value,
        Err(e) => {
            warn!(slot = %slot, error = %e, "Failed to serialize lookup for cache");
            return;
        }
    };
    let entry = json!({ "value": value, "fetched_at": Utc::now().timestamp_millis() });
    if let Err(e) = kv.update_map(cache_key, slot, entry, StorageArea::Session).await {
        warn!(key = %cache_key, slot = %slot, error = %e, "Failed to persist lookup cache");
    }
}
