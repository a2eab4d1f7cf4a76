use async_trait::async_trait;
use guardian_core::concurrency::LockStore;
use guardian_core::error::FetchError;
use guardian_core::storage::{KvMutator, MemoryStorage};
use guardian_core::subscription::{Subscription, SubscriptionBackend, Usage};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub fn kv_over(storage: &Arc<MemoryStorage>) -> KvMutator {
    KvMutator::new(storage.clone(), Arc::new(LockStore::local()))
}

/// Subscription backend with canned answers, an artificial latency and call counters.
pub struct ScriptedBackend {
    pub subscription: Result<Subscription, FetchError>,
    pub usage: Result<Usage, FetchError>,
    pub latency: Duration,
    pub subscription_calls: AtomicUsize,
    pub usage_calls: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new(
        subscription: Result<Subscription, FetchError>,
        usage: Result<Usage, FetchError>,
    ) -> Self {
        Self {
            subscription,
            usage,
            latency: Duration::from_millis(20),
            subscription_calls: AtomicUsize::new(0),
            usage_calls: AtomicUsize::new(0),
        }
    }

    pub fn usage_calls(&self) -> usize {
        self.usage_calls.load(Ordering::SeqCst)
    }

    pub fn subscription_calls(&self) -> usize {
        self.subscription_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SubscriptionBackend for ScriptedBackend {
    async fn fetch_subscription(&self) -> Result<Subscription, FetchError> {
        self.subscription_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.latency).await;
        self.subscription.clone()
    }

    async fn fetch_usage(&self) -> Result<Usage, FetchError> {
        self.usage_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.latency).await;
        self.usage.clone()
    }
}
