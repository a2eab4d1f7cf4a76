//! Core types shared across the persistent-state layer.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Hard per-key size limit enforced by the `sync` area.
pub const SYNC_QUOTA_BYTES_PER_ITEM: usize = 8192;

/// Proactive trim target for sequences written to `sync`.
pub const SYNC_SAFETY_MARGIN: usize = 7168;

/// Trim target used once when `sync` rejects a write as over quota.
pub const SYNC_RETRY_MARGIN: usize = 6144;

/// Named storage area with its own capacity and durability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageArea {
    /// Large capacity, survives process restarts.
    Local,
    /// Large capacity, lives as long as the browser session.
    Session,
    /// Small per-key quota, replicated.
    Sync,
}

impl StorageArea {
    pub const ALL: [StorageArea; 3] = [StorageArea::Local, StorageArea::Session, StorageArea::Sync];

    pub fn as_str(&self) -> &'static str {
        match self {
            StorageArea::Local => "local",
            StorageArea::Session => "session",
            StorageArea::Sync => "sync",
        }
    }

    /// Per-key quota, if the area enforces one.
    pub fn quota_bytes_per_item(&self) -> Option<usize> {
        match self {
            StorageArea::Sync => Some(SYNC_QUOTA_BYTES_PER_ITEM),
            StorageArea::Local | StorageArea::Session => None,
        }
    }
}

impl Default for StorageArea {
    fn default() -> Self {
        StorageArea::Local
    }
}

impl fmt::Display for StorageArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageArea {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(StorageArea::Local),
            "session" => Ok(StorageArea::Session),
            "sync" => Ok(StorageArea::Sync),
            other => Err(format!(
                "Invalid storage area: {} (must be 'local', 'session', or 'sync')",
                other
            )),
        }
    }
}

/// Serialized size of a JSON value in bytes (compact form).
pub fn serialized_size(value: &serde_json::Value) -> usize {
    serde_json::to_string(value).map(|s| s.len()).unwrap_or(0)
}
