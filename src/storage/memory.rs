//! In-memory storage backend.
//!
//! Holds all three areas in process memory and enforces the `sync` per-key
//! quota like the host does. Fault and delay knobs let tests reproduce read
//! failures, quota rejections and interleaved I/O.

use crate::error::StorageError;
use crate::storage::StorageBackend;
use crate::types::{serialized_size, StorageArea, SYNC_QUOTA_BYTES_PER_ITEM};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Default)]
struct Faults {
    fail_reads: bool,
    fail_writes: bool,
    /// Remaining writes to reject as over quota regardless of size
    forced_quota_failures: usize,
}

#[derive(Debug, Default)]
struct DelaySchedule {
    millis: Vec<u64>,
    cursor: usize,
}

impl DelaySchedule {
    fn next(&mut self) -> Option<Duration> {
        if self.millis.is_empty() {
            return None;
        }
        let delay = self.millis[self.cursor % self.millis.len()];
        self.cursor = self.cursor.wrapping_add(1);
        Some(Duration::from_millis(delay))
    }
}

pub struct MemoryStorage {
    areas: Mutex<HashMap<StorageArea, Map<String, Value>>>,
    sync_quota: usize,
    faults: Mutex<Faults>,
    delays: Mutex<DelaySchedule>,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            areas: Mutex::new(HashMap::new()),
            sync_quota: SYNC_QUOTA_BYTES_PER_ITEM,
            faults: Mutex::new(Faults::default()),
            delays: Mutex::new(DelaySchedule::default()),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    /// Override the `sync` per-key quota.
    pub fn with_sync_quota(mut self, bytes: usize) -> Self {
        self.sync_quota = bytes;
        self
    }

    /// Sleep before each operation, cycling through `millis`.
    pub fn with_delays(self, millis: Vec<u64>) -> Self {
        *self.delays.lock() = DelaySchedule { millis, cursor: 0 };
        self
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.faults.lock().fail_reads = fail;
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.faults.lock().fail_writes = fail;
    }

    /// Reject the next `count` writes with a quota error.
    pub fn fail_next_writes_with_quota(&self, count: usize) {
        self.faults.lock().forced_quota_failures = count;
    }

    /// Seed a value without going through the backend contract.
    pub fn insert(&self, area: StorageArea, key: &str, value: Value) {
        self.areas
            .lock()
            .entry(area)
            .or_default()
            .insert(key.to_string(), value);
    }

    /// Current value of a key, bypassing faults and delays.
    pub fn peek(&self, area: StorageArea, key: &str) -> Option<Value> {
        self.areas
            .lock()
            .get(&area)
            .and_then(|entries| entries.get(key).cloned())
    }

    /// Copy every area, e.g. to start a second backend from the same snapshot.
    pub fn snapshot(&self) -> HashMap<StorageArea, Map<String, Value>> {
        self.areas.lock().clone()
    }

    /// Backend preloaded with a snapshot taken from another instance.
    pub fn from_snapshot(snapshot: HashMap<StorageArea, Map<String, Value>>) -> Self {
        let storage = Self::new();
        *storage.areas.lock() = snapshot;
        storage
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        let delay = self.delays.lock().next();
        match delay {
            Some(delay) if !delay.is_zero() => tokio::time::sleep(delay).await,
            // Still yield so zero-delay schedules interleave
            Some(_) => tokio::task::yield_now().await,
            None => {}
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    async fn get(
        &self,
        area: StorageArea,
        keys: &[&str],
    ) -> Result<Map<String, Value>, StorageError> {
        self.pause().await;
        self.reads.fetch_add(1, Ordering::SeqCst);

        if self.faults.lock().fail_reads {
            return Err(StorageError::Read {
                key: keys.join(","),
                area,
                message: "simulated read failure".to_string(),
            });
        }

        let areas = self.areas.lock();
        let mut found = Map::new();
        if let Some(entries) = areas.get(&area) {
            for key in keys {
                if let Some(value) = entries.get(*key) {
                    found.insert((*key).to_string(), value.clone());
                }
            }
        }
        Ok(found)
    }

    async fn set(
        &self,
        area: StorageArea,
        entries: Map<String, Value>,
    ) -> Result<(), StorageError> {
        self.pause().await;

        {
            let mut faults = self.faults.lock();
            if faults.fail_writes {
                return Err(StorageError::Write {
                    key: entries.keys().cloned().collect::<Vec<_>>().join(","),
                    area,
                    message: "simulated write failure".to_string(),
                });
            }
            if faults.forced_quota_failures > 0 {
                faults.forced_quota_failures -= 1;
                let (key, value) = entries
                    .iter()
                    .next()
                    .map(|(k, v)| (k.clone(), serialized_size(v)))
                    .unwrap_or_default();
                return Err(StorageError::QuotaExceeded {
                    key,
                    area,
                    size: value,
                    limit: self.sync_quota,
                });
            }
        }

        if area == StorageArea::Sync {
            for (key, value) in &entries {
                let size = key.len() + serialized_size(value);
                if size > self.sync_quota {
                    return Err(StorageError::QuotaExceeded {
                        key: key.clone(),
                        area,
                        size,
                        limit: self.sync_quota,
                    });
                }
            }
        }

        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut areas = self.areas.lock();
        let target = areas.entry(area).or_default();
        for (key, value) in entries {
            target.insert(key, value);
        }
        Ok(())
    }
}
