//! Sled-backed storage.
//!
//! `local` and `sync` live in named trees of an on-disk database so they
//! survive process restarts. `session` is a temporary database that is gone
//! once the process exits.

use crate::error::StorageError;
use crate::storage::StorageBackend;
use crate::types::{serialized_size, StorageArea};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::Path;
use tracing::debug;

pub struct SledStorage {
    local: ::sled::Tree,
    sync: ::sled::Tree,
    session: ::sled::Tree,
    sync_quota: usize,
    _db: ::sled::Db,
    _session_db: ::sled::Db,
}

impl SledStorage {
    /// Open (or create) the database under `data_dir`.
    pub fn open(data_dir: &Path, sync_quota: usize) -> Result<Self, StorageError> {
        std::fs::create_dir_all(data_dir).map_err(|e| {
            StorageError::Backend(format!(
                "Failed to create storage directory {}: {}",
                data_dir.display(),
                e
            ))
        })?;
        let db = ::sled::open(data_dir.join("state.sled"))?;
        let session_db = ::sled::Config::new().temporary(true).open()?;

        debug!(path = %data_dir.display(), "Opened sled storage");

        Ok(Self {
            local: db.open_tree(StorageArea::Local.as_str())?,
            sync: db.open_tree(StorageArea::Sync.as_str())?,
            session: session_db.open_tree(StorageArea::Session.as_str())?,
            sync_quota,
            _db: db,
            _session_db: session_db,
        })
    }

    fn tree(&self, area: StorageArea) -> &::sled::Tree {
        match area {
            StorageArea::Local => &self.local,
            StorageArea::Session => &self.session,
            StorageArea::Sync => &self.sync,
        }
    }
}

#[async_trait]
impl StorageBackend for SledStorage {
    async fn get(
        &self,
        area: StorageArea,
        keys: &[&str],
    ) -> Result<Map<String, Value>, StorageError> {
        let tree = self.tree(area);
        let mut found = Map::new();
        for key in keys {
            let raw = tree.get(key.as_bytes()).map_err(|e| StorageError::Read {
                key: (*key).to_string(),
                area,
                message: e.to_string(),
            })?;
            if let Some(raw) = raw {
                let value: Value = serde_json::from_slice(&raw)?;
                found.insert((*key).to_string(), value);
            }
        }
        Ok(found)
    }

    async fn set(
        &self,
        area: StorageArea,
        entries: Map<String, Value>,
    ) -> Result<(), StorageError> {
        let tree = self.tree(area);

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

        let mut batch = ::sled::Batch::default();
        for (key, value) in &entries {
            batch.insert(key.as_bytes(), serde_json::to_vec(value)?);
        }
        tree.apply_batch(batch).map_err(|e| StorageError::Write {
            key: entries.keys().cloned().collect::<Vec<_>>().join(","),
            area,
            message: e.to_string(),
        })?;
        tree.flush_async().await?;
        Ok(())
    }
}
