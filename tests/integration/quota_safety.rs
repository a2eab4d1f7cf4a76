use super::support::kv_over;
use guardian_core::storage::{MemoryStorage, QuotaLimits};
use guardian_core::types::{serialized_size, SYNC_QUOTA_BYTES_PER_ITEM, SYNC_SAFETY_MARGIN};
use guardian_core::StorageArea;
use proptest::prelude::*;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::runtime::Runtime;

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 32,
        max_shrink_iters: 50,
        .. ProptestConfig::default()
    })]

    /// Appends to `sync` never store more than the per-key quota, and once
    /// trimming engages the list stops growing.
    #[test]
    fn prop_sync_appends_stay_within_quota(
        item_len in 1usize..600,
        appends in 1usize..80,
    ) {
        let rt = Runtime::new().unwrap();
        let sizes = rt.block_on(async {
            let storage = Arc::new(MemoryStorage::new());
            let kv = kv_over(&storage);
            let mut observed = Vec::with_capacity(appends);

            for n in 0..appends {
                let item = json!({ "n": n % 10, "payload": "x".repeat(item_len) });
                let stored = kv
                    .append_to_array("history", item, None, StorageArea::Sync)
                    .await
                    .unwrap();
                let raw = storage.peek(StorageArea::Sync, "history").unwrap();
                observed.push((stored.len(), serialized_size(&raw)));
            }
            observed
        });

        let mut trimmed_len: Option<usize> = None;
        for (n, (len, size)) in sizes.iter().enumerate() {
            prop_assert!(*size <= SYNC_QUOTA_BYTES_PER_ITEM);
            prop_assert!(*size <= SYNC_SAFETY_MARGIN);
            match trimmed_len {
                Some(cap) => prop_assert!(*len <= cap),
                None if *len < n + 1 => trimmed_len = Some(*len),
                None => {}
            }
        }
    }
}

#[tokio::test]
async fn quota_rejection_triggers_one_trimmed_retry() {
    let storage = Arc::new(MemoryStorage::new());
    let kv = kv_over(&storage);
    let items: Vec<Value> = (0..40).map(|n| json!({"n": n, "text": "y".repeat(150)})).collect();
    storage.insert(StorageArea::Sync, "history", Value::Array(items));

    storage.fail_next_writes_with_quota(1);
    let stored = kv
        .append_to_array("history", json!({"n": 99}), None, StorageArea::Sync)
        .await
        .unwrap();

    let raw = storage.peek(StorageArea::Sync, "history").unwrap();
    assert_eq!(Value::Array(stored), raw);
    assert!(serialized_size(&raw) <= QuotaLimits::default().retry_margin);
}

#[tokio::test]
async fn second_quota_rejection_propagates() {
    let storage = Arc::new(MemoryStorage::new());
    let kv = kv_over(&storage);

    storage.fail_next_writes_with_quota(2);
    let err = kv
        .append_to_array("history", json!("entry"), None, StorageArea::Sync)
        .await
        .unwrap_err();
    assert!(err.is_quota());
    assert!(storage.peek(StorageArea::Sync, "history").is_none());
}

#[tokio::test]
async fn oversized_scalar_on_sync_is_rejected() {
    let storage = Arc::new(MemoryStorage::new());
    let kv = kv_over(&storage);

    let big = json!("z".repeat(SYNC_QUOTA_BYTES_PER_ITEM + 10));
    let err = kv
        .update_storage("blob", move |_| big, StorageArea::Sync)
        .await
        .unwrap_err();
    assert!(err.is_quota());
}

#[tokio::test]
async fn max_length_takes_priority_and_zero_keeps_nothing() {
    let storage = Arc::new(MemoryStorage::new());
    let kv = kv_over(&storage);

    for n in 0..5 {
        kv.append_to_array("recent", json!(n), Some(3), StorageArea::Local)
            .await
            .unwrap();
    }
    assert_eq!(
        storage.peek(StorageArea::Local, "recent"),
        Some(json!([2, 3, 4]))
    );

    let stored = kv
        .append_to_array("never", json!(1), Some(0), StorageArea::Local)
        .await
        .unwrap();
    assert!(stored.is_empty());
    assert_eq!(storage.peek(StorageArea::Local, "never"), Some(json!([])));
}
