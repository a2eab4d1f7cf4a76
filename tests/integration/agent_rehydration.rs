use super::support::kv_over;
use guardian_core::agent::{default_catalog, AgentRegistry, AgentState, ListFilter, SortBy};
use guardian_core::concurrency::LockStore;
use guardian_core::storage::{KvMutator, MemoryStorage, SledStorage};
use guardian_core::types::SYNC_QUOTA_BYTES_PER_ITEM;
use std::sync::Arc;

const KEY: &str = "guardian_states";

#[tokio::test]
async fn two_registries_over_one_snapshot_list_identically() {
    let storage = Arc::new(MemoryStorage::new());
    {
        let registry = AgentRegistry::load(kv_over(&storage), KEY, default_catalog()).await;
        registry.activate("ALRAX").await.unwrap();
        registry.amplify("ZERO", 3.0).await.unwrap();
        registry.validate("poly").await.unwrap();
    }

    let snapshot = storage.snapshot();
    let first_storage = Arc::new(MemoryStorage::from_snapshot(snapshot.clone()));
    let second_storage = Arc::new(MemoryStorage::from_snapshot(snapshot));
    let first = AgentRegistry::load(kv_over(&first_storage), KEY, default_catalog()).await;
    let second = AgentRegistry::load(kv_over(&second_storage), KEY, default_catalog()).await;

    for (filter, sort_by) in [
        (ListFilter::All, SortBy::Frequency),
        (ListFilter::All, SortBy::Name),
        (ListFilter::All, SortBy::State),
        (ListFilter::Active, SortBy::Frequency),
    ] {
        assert_eq!(
            first.list(filter, sort_by).await,
            second.list(filter, sort_by).await
        );
    }

    let zero = first.status("zero").await.unwrap();
    assert_eq!(zero.state, AgentState::Amplified);
    assert_eq!(zero.amplification, 3.0);
}

#[tokio::test]
async fn registry_state_survives_reopening_the_database() {
    let temp = tempfile::tempdir().unwrap();
    let open = || {
        let storage = SledStorage::open(temp.path(), SYNC_QUOTA_BYTES_PER_ITEM).unwrap();
        KvMutator::new(Arc::new(storage), Arc::new(LockStore::local()))
    };

    {
        let registry = AgentRegistry::load(open(), KEY, default_catalog()).await;
        registry.amplify("AEYON", 3.0).await.unwrap();
        registry.amplify("AEYON", 5.0).await.unwrap();
    }

    let registry = AgentRegistry::load(open(), KEY, default_catalog()).await;
    let aeyon = registry.status("AEYON").await.unwrap();
    assert_eq!(aeyon.amplification, 10.0);
    assert_eq!(aeyon.metrics.amplifications, 2);
}

#[tokio::test]
async fn error_state_is_durable_until_validated() {
    let storage = Arc::new(MemoryStorage::new());
    {
        let registry = AgentRegistry::load(kv_over(&storage), KEY, default_catalog()).await;
        storage.set_fail_writes(true);
        assert!(registry.activate("META").await.is_err());
        assert!(registry.activate("YAGNI").await.is_err());
        storage.set_fail_writes(false);
        // A later successful write carries every agent's current state
        registry.activate("YOU").await.unwrap();
    }

    let registry = AgentRegistry::load(kv_over(&storage), KEY, default_catalog()).await;
    let errored = registry.list(ListFilter::Error, SortBy::Name).await;
    let names: Vec<&str> = errored.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["META", "YAGNI"]);

    let outcome = registry.validate("META").await.unwrap();
    assert!(outcome.report.success);
    assert_eq!(outcome.agent.state, AgentState::Standby);
    assert_eq!(outcome.agent.error_count, 1);
}
