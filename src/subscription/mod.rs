//! Subscription and usage lookups.

pub mod backend;
pub mod service;
pub mod types;

pub use backend::{HttpSubscriptionBackend, SubscriptionBackend};
pub use service::{DenyReason, RequestDecision, SubscriptionService};
pub use types::{status_display_name, tier_display_name, Subscription, Usage};
