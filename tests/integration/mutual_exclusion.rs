use super::support::kv_over;
use guardian_core::concurrency::LockStore;
use guardian_core::storage::{KvMutator, MemoryStorage};
use guardian_core::StorageArea;
use proptest::prelude::*;
use serde_json::json;
use std::sync::Arc;
use tokio::runtime::Runtime;

async fn run_increments(kv: &KvMutator, calls: usize) -> Vec<i64> {
    let handles: Vec<_> = (0..calls)
        .map(|_| {
            let kv = kv.clone();
            tokio::spawn(async move {
                kv.increment_counter("req_count", 1, StorageArea::Local)
                    .await
            })
        })
        .collect();

    let mut results = Vec::with_capacity(calls);
    for handle in handles {
        results.push(handle.await.unwrap().unwrap());
    }
    results
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 24,
        max_shrink_iters: 50,
        .. ProptestConfig::default()
    })]

    /// N concurrent increments always land, whatever the I/O interleaving.
    #[test]
    fn prop_concurrent_increments_are_not_lost(
        initial in -50i64..50,
        calls in 1usize..24,
        delays in proptest::collection::vec(0u64..3, 1..8),
    ) {
        let rt = Runtime::new().unwrap();
        let (stored, mut results) = rt.block_on(async {
            let storage = Arc::new(MemoryStorage::new().with_delays(delays));
            storage.insert(StorageArea::Local, "req_count", json!(initial));
            let kv = kv_over(&storage);

            let results = run_increments(&kv, calls).await;
            (storage.peek(StorageArea::Local, "req_count"), results)
        });

        prop_assert_eq!(stored, Some(json!(initial + calls as i64)));

        // Every caller saw a distinct intermediate value
        results.sort_unstable();
        let expected: Vec<i64> = (1..=calls as i64).map(|n| initial + n).collect();
        prop_assert_eq!(results, expected);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_appends_keep_every_item() {
    let storage = Arc::new(MemoryStorage::new().with_delays(vec![0, 2, 1]));
    let kv = kv_over(&storage);

    let handles: Vec<_> = (0..16)
        .map(|n| {
            let kv = kv.clone();
            tokio::spawn(async move {
                kv.append_to_array("events", json!(n), None, StorageArea::Local)
                    .await
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let mut stored: Vec<i64> = storage
        .peek(StorageArea::Local, "events")
        .unwrap()
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_i64().unwrap())
        .collect();
    stored.sort_unstable();
    assert_eq!(stored, (0..16).collect::<Vec<_>>());
}

#[tokio::test]
async fn concurrent_map_updates_merge() {
    let storage = Arc::new(MemoryStorage::new().with_delays(vec![1, 0]));
    let kv = kv_over(&storage);

    let a = kv.update_map("prefs", "theme", json!("dark"), StorageArea::Local);
    let b = kv.update_map("prefs", "lang", json!("en"), StorageArea::Local);
    let (a, b) = tokio::join!(a, b);
    a.unwrap();
    b.unwrap();

    assert_eq!(
        storage.peek(StorageArea::Local, "prefs"),
        Some(json!({"theme": "dark", "lang": "en"}))
    );
}

/// Without a lock facility the mutator still works for a single caller.
#[tokio::test]
async fn missing_lock_facility_degrades_to_direct_execution() {
    let storage = Arc::new(MemoryStorage::new());
    let kv = KvMutator::new(storage.clone(), Arc::new(LockStore::unavailable()));

    assert_eq!(kv.increment_counter("n", 1, StorageArea::Local).await.unwrap(), 1);
    assert_eq!(kv.increment_counter("n", 1, StorageArea::Local).await.unwrap(), 2);
}
