//! Configuration
//!
//! Layered configuration: built-in defaults, then an optional TOML file, then
//! `GUARDIAN__*` environment variables (highest precedence).

pub mod facade;
pub mod merge;
pub mod paths;
pub mod sources;

use crate::error::ApiError;
use crate::logging::LoggingConfig;
use crate::storage::QuotaLimits;
use crate::types::{SYNC_QUOTA_BYTES_PER_ITEM, SYNC_RETRY_MARGIN, SYNC_SAFETY_MARGIN};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub use facade::ConfigLoader;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoreConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub subscription: SubscriptionConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
}

impl CoreConfig {
    pub fn validate(&self) -> Result<(), ApiError> {
        self.storage.validate()?;
        self.subscription.validate()?;
        if self.registry.storage_key.trim().is_empty() {
            return Err(ApiError::ConfigError(
                "registry.storage_key cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory of the durable database; `None` uses the XDG data directory
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    #[serde(default = "default_sync_quota")]
    pub sync_quota_bytes: usize,

    #[serde(default = "default_safety_margin")]
    pub sync_safety_margin: usize,

    #[serde(default = "default_retry_margin")]
    pub sync_retry_margin: usize,

    #[serde(default = "default_history_key")]
    pub history_key: String,

    #[serde(default = "default_history_max_entries")]
    pub history_max_entries: usize,
}

fn default_sync_quota() -> usize {
    SYNC_QUOTA_BYTES_PER_ITEM
}

fn default_safety_margin() -> usize {
    SYNC_SAFETY_MARGIN
}

fn default_retry_margin() -> usize {
    SYNC_RETRY_MARGIN
}

fn default_history_key() -> String {
    "analysis_history".to_string()
}

fn default_history_max_entries() -> usize {
    50
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            sync_quota_bytes: default_sync_quota(),
            sync_safety_margin: default_safety_margin(),
            sync_retry_margin: default_retry_margin(),
            history_key: default_history_key(),
            history_max_entries: default_history_max_entries(),
        }
    }
}

impl StorageConfig {
    pub fn quota_limits(&self) -> QuotaLimits {
        QuotaLimits {
            safety_margin: self.sync_safety_margin,
            retry_margin: self.sync_retry_margin,
        }
    }

    /// Resolve the database directory.
    pub fn resolve_data_dir(&self) -> Result<PathBuf, ApiError> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => paths::xdg_root::default_data_dir(),
        }
    }

    fn validate(&self) -> Result<(), ApiError> {
        if !(self.sync_retry_margin < self.sync_safety_margin
            && self.sync_safety_margin < self.sync_quota_bytes)
        {
            return Err(ApiError::ConfigError(format!(
                "sync margins must satisfy retry ({}) < safety ({}) < quota ({})",
                self.sync_retry_margin, self.sync_safety_margin, self.sync_quota_bytes
            )));
        }
        Ok(())
    }
}

/// Subscription backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionConfig {
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_extension_version")]
    pub extension_version: String,

    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Tier exempt from usage limits
    #[serde(default = "default_unlimited_tier")]
    pub unlimited_tier: String,

    /// Usage percentage at which requests are allowed with a warning
    #[serde(default = "default_warning_threshold")]
    pub warning_threshold: f64,

    /// `session` storage key mirroring the lookup cache
    #[serde(default = "default_cache_key")]
    pub cache_key: String,
}

fn default_gateway_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_extension_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_unlimited_tier() -> String {
    "enterprise".to_string()
}

fn default_warning_threshold() -> f64 {
    80.0
}

fn default_cache_key() -> String {
    "subscription_cache".to_string()
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            gateway_url: default_gateway_url(),
            api_key: None,
            extension_version: default_extension_version(),
            cache_ttl_secs: default_cache_ttl_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            unlimited_tier: default_unlimited_tier(),
            warning_threshold: default_warning_threshold(),
            cache_key: default_cache_key(),
        }
    }
}

impl SubscriptionConfig {
    fn validate(&self) -> Result<(), ApiError> {
        if self.cache_ttl_secs == 0 {
            return Err(ApiError::ConfigError(
                "subscription.cache_ttl_secs must be positive".to_string(),
            ));
        }
        if !(0.0..=100.0).contains(&self.warning_threshold) {
            return Err(ApiError::ConfigError(format!(
                "subscription.warning_threshold must be between 0 and 100, got {}",
                self.warning_threshold
            )));
        }
        if !(self.gateway_url.starts_with("http://") || self.gateway_url.starts_with("https://")) {
            return Err(ApiError::ConfigError(format!(
                "Invalid gateway URL: {}",
                self.gateway_url
            )));
        }
        Ok(())
    }
}

/// Agent registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// `local` storage key holding persisted agent state
    #[serde(default = "default_registry_key")]
    pub storage_key: String,
}

fn default_registry_key() -> String {
    "guardian_states".to_string()
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            storage_key: default_registry_key(),
        }
    }
}
