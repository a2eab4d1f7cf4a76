//! Subscription backend port and its HTTP adapter.

use crate::config::SubscriptionConfig;
use crate::error::FetchError;
use crate::subscription::types::{Subscription, Usage};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

pub const SUBSCRIPTION_PATH: &str = "/api/v1/subscriptions/current";
pub const USAGE_PATH: &str = "/api/v1/subscriptions/usage";

/// Remote source of subscription and usage records.
///
/// Implementations report a missing record as [`FetchError::NotFound`] and
/// rejected credentials as [`FetchError::Unauthorized`].
#[async_trait]
pub trait SubscriptionBackend: Send + Sync {
    async fn fetch_subscription(&self) -> Result<Subscription, FetchError>;
    async fn fetch_usage(&self) -> Result<Usage, FetchError>;
}

/// Bearer-authenticated JSON client for the gateway.
pub struct HttpSubscriptionBackend {
    client: reqwest::Client,
    gateway_url: String,
    api_key: Option<String>,
    extension_version: String,
    request_seq: AtomicU64,
}

impl HttpSubscriptionBackend {
    pub fn new(config: &SubscriptionConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            gateway_url: config.gateway_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            extension_version: config.extension_version.clone(),
            request_seq: AtomicU64::new(0),
        })
    }

    fn request_id(&self, prefix: &str) -> String {
        let seq = self.request_seq.fetch_add(1, Ordering::Relaxed);
        format!("{}_{}_{}", prefix, chrono::Utc::now().timestamp_millis(), seq)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        prefix: &str,
    ) -> Result<T, FetchError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| FetchError::NotConfigured("api_key is not set".to_string()))?;
        let url = format!("{}{}", self.gateway_url, path);
        info!(url = %url, "Fetching subscription data");

        let response = self
            .client
            .get(&url)
            .bearer_auth(api_key)
            .header("Content-Type", "application/json")
            .header("X-Extension-Version", &self.extension_version)
            .header("X-Request-ID", self.request_id(prefix))
            .send()
            .await?;

        classify_status(response.status())?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status { status, body });
        }

        response.json::<T>().await.map_err(|e| FetchError::Decode(e.to_string()))
    }
}

/// Map the statuses that have a dedicated meaning.
fn classify_status(status: StatusCode) -> Result<(), FetchError> {
    match status {
        StatusCode::UNAUTHORIZED => Err(FetchError::Unauthorized),
        StatusCode::NOT_FOUND => Err(FetchError::NotFound),
        _ => Ok(()),
    }
}

#[async_trait]
impl SubscriptionBackend for HttpSubscriptionBackend {
    async fn fetch_subscription(&self) -> Result<Subscription, FetchError> {
        let subscription: Subscription = self.get_json(SUBSCRIPTION_PATH, "sub").await?;
        info!(
            tier = %subscription.tier,
            status = %subscription.status,
            "Subscription status retrieved"
        );
        Ok(subscription)
    }

    async fn fetch_usage(&self) -> Result<Usage, FetchError> {
        let usage: Usage = self.get_json(USAGE_PATH, "usage").await?;
        info!(
            usage_percentage = usage.usage_percentage,
            remaining_requests = ?usage.remaining_requests,
            "Usage statistics retrieved"
        );
        Ok(usage)
    }
}
