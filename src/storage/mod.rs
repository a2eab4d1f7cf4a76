//! Durable key-value storage
//!
//! Backends expose three areas (`local`, `session`, `sync`) with an async
//! get/set contract. All mutation of shared keys goes through the
//! [`KvMutator`], which serializes writers per key.

pub mod history;
pub mod memory;
pub mod mutator;
pub mod sled;

use crate::error::StorageError;
use crate::types::StorageArea;
use async_trait::async_trait;
use serde_json::{Map, Value};

pub use history::{AnalysisHistory, HistoryEntry};
pub use memory::MemoryStorage;
pub use mutator::{trim_array_for_quota, KvMutator, QuotaLimits};
pub use self::sled::SledStorage;

/// Storage backend contract.
///
/// A key that is absent is not an error: it is simply missing from the
/// returned map. Quota rejections from `set` are reported as
/// `QuotaExceeded`, or as a `Write`/`Backend` error whose message
/// [`StorageError::is_quota`] recognises.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Read the given keys from `area`.
    async fn get(
        &self,
        area: StorageArea,
        keys: &[&str],
    ) -> Result<Map<String, Value>, StorageError>;

    /// Write all entries to `area`.
    async fn set(
        &self,
        area: StorageArea,
        entries: Map<String, Value>,
    ) -> Result<(), StorageError>;
}

/// Read a single key, `None` when absent.
pub async fn get_one(
    backend: &dyn StorageBackend,
    area: StorageArea,
    key: &str,
) -> Result<Option<Value>, StorageError> {
    let mut found = backend.get(area, &[key]).await?;
    Ok(found.remove(key))
}

/// Write a single key.
pub async fn set_one(
    backend: &dyn StorageBackend,
    area: StorageArea,
    key: &str,
    value: Value,
) -> Result<(), StorageError> {
    let mut entries = Map::new();
    entries.insert(key.to_string(), value);
    backend.set(area, entries).await
}
