//! Subscription and usage records.
//!
//! Only the fields the request policy reads are typed; everything else the
//! backend sends is carried through untouched in `extra`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    #[serde(default = "default_tier")]
    pub tier: String,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default)]
    pub billing_period: Option<String>,
    #[serde(default)]
    pub current_period_end: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_tier() -> String {
    "free".to_string()
}

fn default_status() -> String {
    "active".to_string()
}

impl Default for Subscription {
    /// Free tier, active. Used whenever the real record is unavailable.
    fn default() -> Self {
        Self {
            tier: default_tier(),
            status: default_status(),
            billing_period: None,
            current_period_end: None,
            extra: Map::new(),
        }
    }
}

impl Subscription {
    pub fn is_active(&self) -> bool {
        self.status == "active"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub requests_made: u64,
    /// `None` means unlimited
    #[serde(default)]
    pub requests_limit: Option<u64>,
    #[serde(default)]
    pub usage_percentage: f64,
    #[serde(default)]
    pub remaining_requests: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Usage {
    /// Zero usage, no limit.
    fn default() -> Self {
        Self {
            requests_made: 0,
            requests_limit: None,
            usage_percentage: 0.0,
            remaining_requests: None,
            extra: Map::new(),
        }
    }
}

/// Display name for a subscription tier.
pub fn tier_display_name(tier: &str) -> String {
    match tier {
        "free" => "Free".to_string(),
        "pro" => "Pro".to_string(),
        "enterprise" => "Enterprise".to_string(),
        "" => "Unknown".to_string(),
        other => other.to_string(),
    }
}

/// Display name for a subscription status.
pub fn status_display_name(status: &str) -> String {
    match status {
        "active" => "Active".to_string(),
        "cancelled" => "Cancelled".to_string(),
        "expired" => "Expired".to_string(),
        "trialing" => "Trial".to_string(),
        "past_due" => "Past Due".to_string(),
        "" => "Unknown".to_string(),
        other => other.to_string(),
    }
}
