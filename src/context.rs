//! Process-wide wiring.
//!
//! Everything is built once at startup and handed out by reference. Building
//! a context is also the rehydration step: the agent registry and the
//! subscription cache are restored from storage before `open` returns.

use crate::agent::{default_catalog, AgentRegistry};
use crate::concurrency::LockStore;
use crate::config::CoreConfig;
use crate::error::ApiError;
use crate::storage::{AnalysisHistory, KvMutator, MemoryStorage, SledStorage, StorageBackend};
use crate::subscription::{HttpSubscriptionBackend, SubscriptionBackend, SubscriptionService};
use std::sync::Arc;
use tracing::info;

pub struct CoreContext {
    config: CoreConfig,
    kv: KvMutator,
    registry: AgentRegistry,
    subscriptions: SubscriptionService,
    history: AnalysisHistory,
}

impl CoreContext {
    /// Context over the sled database in the configured data directory.
    pub async fn open(config: CoreConfig) -> Result<Self, ApiError> {
        let data_dir = config.storage.resolve_data_dir()?;
        let storage = SledStorage::open(&data_dir, config.storage.sync_quota_bytes)?;
        info!(data_dir = %data_dir.display(), "Opened durable storage");
        let backend = http_backend(&config)?;
        Ok(Self::with_backends(config, Arc::new(storage), backend).await)
    }

    /// Context over process-local memory; nothing outlives the process.
    pub async fn in_memory(config: CoreConfig) -> Result<Self, ApiError> {
        let storage = MemoryStorage::new().with_sync_quota(config.storage.sync_quota_bytes);
        let backend = http_backend(&config)?;
        Ok(Self::with_backends(config, Arc::new(storage), backend).await)
    }

    pub async fn with_backends(
        config: CoreConfig,
        storage: Arc<dyn StorageBackend>,
        subscription_backend: Arc<dyn SubscriptionBackend>,
    ) -> Self {
        let locks = Arc::new(LockStore::local());
        let kv = KvMutator::with_limits(storage, locks, config.storage.quota_limits());

        let registry =
            AgentRegistry::load(kv.clone(), config.registry.storage_key.clone(), default_catalog())
                .await;
        let subscriptions =
            SubscriptionService::load(subscription_backend, kv.clone(), &config.subscription).await;
        let history = AnalysisHistory::new(
            kv.clone(),
            config.storage.history_key.clone(),
            config.storage.history_max_entries,
        );

        Self {
            config,
            kv,
            registry,
            subscriptions,
            history,
        }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn kv(&self) -> &KvMutator {
        &self.kv
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn subscriptions(&self) -> &SubscriptionService {
        &self.subscriptions
    }

    pub fn history(&self) -> &AnalysisHistory {
        &self.history
    }
}

fn http_backend(config: &CoreConfig) -> Result<Arc<dyn SubscriptionBackend>, ApiError> {
    let backend = HttpSubscriptionBackend::new(&config.subscription).map_err(|e| {
        ApiError::ConfigError(format!("Failed to build subscription client: {}", e))
    })?;
    Ok(Arc::new(backend))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentState;
    use crate::types::StorageArea;

    #[tokio::test]
    async fn test_sled_context_rehydrates_registry() {
        let temp = tempfile::tempdir().unwrap();
        let mut config = CoreConfig::default();
        config.storage.data_dir = Some(temp.path().to_path_buf());

        {
            let context = CoreContext::open(config.clone()).await.unwrap();
            context.registry().activate("AEYON").await.unwrap();
            context
                .kv()
                .increment_counter("req_count", 1, StorageArea::Local)
                .await
                .unwrap();
        }

        let context = CoreContext::open(config).await.unwrap();
        let agent = context.registry().status("AEYON").await.unwrap();
        assert_eq!(agent.state, AgentState::Active);
        assert_eq!(
            context
                .kv()
                .increment_counter("req_count", 1, StorageArea::Local)
                .await
                .unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn test_in_memory_context_uses_configured_history() {
        let mut config = CoreConfig::default();
        config.storage.history_max_entries = 2;
        let context = CoreContext::in_memory(config).await.unwrap();

        for text in ["a", "b", "c"] {
            let entry = crate::storage::HistoryEntry::new(text, None, None);
            assert!(context.history().save(entry).await);
        }
        assert_eq!(context.history().recent(10).await.len(), 2);
    }
}
