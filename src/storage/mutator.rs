//! Durable KV mutator
//!
//! Atomic read-modify-write over a [`StorageBackend`]. Every mutation of a key
//! runs inside the advisory lock `storage_update_<key>`, so concurrent callers
//! on the same key are linearized and never observe a half-applied value.
//!
//! Sequences written to `sync` are trimmed from the tail to the safety margin
//! before the write, and trimmed once more to the retry margin if the store
//! still rejects the write as over quota.

use crate::concurrency::LockStore;
use crate::error::StorageError;
use crate::storage::{get_one, set_one, StorageBackend};
use crate::types::{serialized_size, StorageArea, SYNC_RETRY_MARGIN, SYNC_SAFETY_MARGIN};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Trim targets for sequences stored in `sync`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaLimits {
    /// Applied before every write of a sequence to `sync`
    pub safety_margin: usize,
    /// Applied once after the store rejects a write as over quota
    pub retry_margin: usize,
}

impl Default for QuotaLimits {
    fn default() -> Self {
        Self {
            safety_margin: SYNC_SAFETY_MARGIN,
            retry_margin: SYNC_RETRY_MARGIN,
        }
    }
}

/// Drop elements from the end of `array` until its JSON form fits in
/// `max_size_bytes`, or nothing is left.
///
/// Callers keep newest entries at the head, so the tail holds the oldest.
pub fn trim_array_for_quota(mut array: Vec<Value>, max_size_bytes: usize) -> Vec<Value> {
    let element_sizes: Vec<usize> = array.iter().map(serialized_size).collect();
    // "[" + "]" + elements + separating commas
    let mut size = 2 + element_sizes.iter().sum::<usize>() + array.len().saturating_sub(1);
    let original_len = array.len();

    while size > max_size_bytes && !array.is_empty() {
        let removed = element_sizes[array.len() - 1];
        let comma = usize::from(array.len() > 1);
        array.pop();
        size -= removed + comma;
    }

    if array.len() != original_len {
        warn!(
            original_len,
            trimmed_len = array.len(),
            trimmed_size = size,
            max_size_bytes,
            "Trimmed array to fit quota"
        );
    }

    array
}

fn trim_value(value: Value, max_size_bytes: usize) -> Value {
    match value {
        Value::Array(items) => Value::Array(trim_array_for_quota(items, max_size_bytes)),
        other => other,
    }
}

/// Lock name guarding mutations of `key`.
pub fn lock_name_for(key: &str) -> String {
    format!("storage_update_{}", key)
}

/// Serializes read-modify-write cycles per key.
#[derive(Clone)]
pub struct KvMutator {
    backend: Arc<dyn StorageBackend>,
    locks: Arc<LockStore>,
    limits: QuotaLimits,
}

impl KvMutator {
    pub fn new(backend: Arc<dyn StorageBackend>, locks: Arc<LockStore>) -> Self {
        Self::with_limits(backend, locks, QuotaLimits::default())
    }

    pub fn with_limits(
        backend: Arc<dyn StorageBackend>,
        locks: Arc<LockStore>,
        limits: QuotaLimits,
    ) -> Self {
        Self {
            backend,
            locks,
            limits,
        }
    }

    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    pub fn limits(&self) -> QuotaLimits {
        self.limits
    }

    /// Plain read without taking the key's lock.
    pub async fn read(&self, key: &str, area: StorageArea) -> Result<Option<Value>, StorageError> {
        get_one(self.backend.as_ref(), area, key).await
    }

    /// Atomically replace the value of `key` with `modifier(current)`.
    ///
    /// `modifier` receives `None` when the key is absent or the read failed.
    /// Returns the value actually written, which may be a trimmed version of
    /// what `modifier` produced when writing sequences to `sync`.
    ///
    /// The critical section runs on its own task: a caller that stops awaiting
    /// does not cancel the write and cannot leave the lock held.
    pub async fn update_storage<F>(
        &self,
        key: &str,
        modifier: F,
        area: StorageArea,
    ) -> Result<Value, StorageError>
    where
        F: FnOnce(Option<Value>) -> Value + Send + 'static,
    {
        let lock_name = lock_name_for(key);
        let backend = Arc::clone(&self.backend);
        let locks = Arc::clone(&self.locks);
        let limits = self.limits;
        let key = key.to_string();
        let task_key = key.clone();

        let task = tokio::spawn(async move {
            locks
                .with_lock(&lock_name, move || async move {
                    read_modify_write(backend.as_ref(), &task_key, modifier, area, limits).await
                })
                .await
        });

        task.await.map_err(|e| {
            error!(key = %key, area = %area, error = %e, "Storage critical section aborted");
            StorageError::Task(key)
        })?
    }

    /// Add `by` to a numeric counter. Missing or non-numeric values count as 0.
    pub async fn increment_counter(
        &self,
        key: &str,
        by: i64,
        area: StorageArea,
    ) -> Result<i64, StorageError> {
        let value = self
            .update_storage(
                key,
                move |current| {
                    let base = current.as_ref().and_then(counter_value).unwrap_or(0);
                    Value::from(base.saturating_add(by))
                },
                area,
            )
            .await?;
        Ok(counter_value(&value).unwrap_or(0))
    }

    pub async fn decrement_counter(
        &self,
        key: &str,
        by: i64,
        area: StorageArea,
    ) -> Result<i64, StorageError> {
        self.increment_counter(key, by.saturating_neg(), area).await
    }

    /// Push `item` to the end of the list stored at `key`.
    ///
    /// With `max_length`, only the most recently appended `max_length` items
    /// are kept. On `sync` the list is also trimmed to the safety margin.
    pub async fn append_to_array(
        &self,
        key: &str,
        item: Value,
        max_length: Option<usize>,
        area: StorageArea,
    ) -> Result<Vec<Value>, StorageError> {
        let margin = self.limits.safety_margin;
        let value = self
            .update_storage(
                key,
                move |current| {
                    let mut array = into_array(current);
                    array.push(item);
                    if let Some(max) = max_length {
                        if array.len() > max {
                            let excess = array.len() - max;
                            array.drain(..excess);
                        }
                    }
                    if area == StorageArea::Sync {
                        array = trim_array_for_quota(array, margin);
                    }
                    Value::Array(array)
                },
                area,
            )
            .await?;
        Ok(into_array(Some(value)))
    }

    /// Insert `item` at the head of the list stored at `key`.
    ///
    /// With `max_length`, only the first `max_length` items are kept; quota
    /// trimming on `sync` removes the oldest entries from the tail.
    pub async fn prepend_to_array(
        &self,
        key: &str,
        item: Value,
        max_length: Option<usize>,
        area: StorageArea,
    ) -> Result<Vec<Value>, StorageError> {
        let margin = self.limits.safety_margin;
        let value = self
            .update_storage(
                key,
                move |current| {
                    let mut array = into_array(current);
                    array.insert(0, item);
                    if let Some(max) = max_length {
                        array.truncate(max);
                    }
                    if area == StorageArea::Sync {
                        array = trim_array_for_quota(array, margin);
                    }
                    Value::Array(array)
                },
                area,
            )
            .await?;
        Ok(into_array(Some(value)))
    }

    /// Shallow-merge `{map_key: value}` into the object stored at `key`.
    pub async fn update_map(
        &self,
        key: &str,
        map_key: &str,
        value: Value,
        area: StorageArea,
    ) -> Result<Map<String, Value>, StorageError> {
        let map_key = map_key.to_string();
        let updated = self
            .update_storage(
                key,
                move |current| {
                    let mut map = match current {
                        Some(Value::Object(map)) => map,
                        _ => Map::new(),
                    };
                    map.insert(map_key, value);
                    Value::Object(map)
                },
                area,
            )
            .await?;
        match updated {
            Value::Object(map) => Ok(map),
            _ => Ok(Map::new()),
        }
    }
}

fn counter_value(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
}

fn into_array(value: Option<Value>) -> Vec<Value> {
    match value {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    }
}

async fn read_modify_write<F>(
    backend: &dyn StorageBackend,
    key: &str,
    modifier: F,
    area: StorageArea,
    limits: QuotaLimits,
) -> Result<Value, StorageError>
where
    F: FnOnce(Option<Value>) -> Value,
{
    let current = match get_one(backend, area, key).await {
        Ok(value) => value,
        Err(err) => {
            warn!(
                key = %key,
                area = %area,
                error = %err,
                "Storage read failed, treating value as absent"
            );
            None
        }
    };
    let previous_size = current.as_ref().map(serialized_size).unwrap_or(0);

    let mut new_value = modifier(current);

    if area == StorageArea::Sync && new_value.is_array() {
        let size = serialized_size(&new_value);
        if size > limits.safety_margin {
            warn!(
                key = %key,
                size,
                safety_margin = limits.safety_margin,
                "Sequence exceeds sync safety margin, trimming before write"
            );
            new_value = trim_value(new_value, limits.safety_margin);
            if new_value.as_array().map(Vec::is_empty).unwrap_or(false) {
                warn!(key = %key, "Trimming removed every entry; discarding untrimmed value");
            }
        }
    }

    let attempted_size = serialized_size(&new_value);
    match set_one(backend, area, key, new_value.clone()).await {
        Ok(()) => {
            debug!(key = %key, area = %area, size = attempted_size, "Storage updated");
            Ok(new_value)
        }
        Err(err) if area == StorageArea::Sync && err.is_quota() && new_value.is_array() => {
            warn!(
                key = %key,
                attempted_size,
                retry_margin = limits.retry_margin,
                error = %err,
                "Quota error on sync write, trimming and retrying once"
            );
            let retry_value = trim_value(new_value, limits.retry_margin);
            let retry_size = serialized_size(&retry_value);
            match set_one(backend, area, key, retry_value.clone()).await {
                Ok(()) => Ok(retry_value),
                Err(retry_err) => {
                    error!(
                        key = %key,
                        area = %area,
                        attempted_size = retry_size,
                        previous_size,
                        error = %retry_err,
                        "Storage write failed after quota retry"
                    );
                    Err(retry_err)
                }
            }
        }
        Err(err) => {
            error!(
                key = %key,
                area = %area,
                attempted_size,
                previous_size,
                size_increase = attempted_size as i64 - previous_size as i64,
                error = %err,
                "Storage write failed"
            );
            Err(err)
        }
    }
}
