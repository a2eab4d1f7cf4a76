//! Analysis history kept in `sync` storage.
//!
//! Newest entries sit at the head of the list, so quota trimming drops the
//! oldest ones. Saving history is best effort: failures are logged and the
//! caller carries on.

use crate::storage::KvMutator;
use crate::types::StorageArea;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

const PREVIEW_CHARS: usize = 100;

/// Compact record of one analysis, small enough for `sync`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// First 100 characters of the analysed text, with "..." when cut
    pub text: String,
    pub full_text: String,
    pub score: Option<f64>,
    pub bias_type: String,
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(text: &str, score: Option<f64>, bias_type: Option<&str>) -> Self {
        let mut preview: String = text.chars().take(PREVIEW_CHARS).collect();
        if text.chars().count() > PREVIEW_CHARS {
            preview.push_str("...");
        }
        Self {
            text: preview,
            full_text: text.to_string(),
            score,
            bias_type: bias_type
                .filter(|b| !b.trim().is_empty())
                .unwrap_or("Unknown")
                .to_string(),
            timestamp: Utc::now(),
        }
    }
}

pub struct AnalysisHistory {
    kv: KvMutator,
    key: String,
    max_entries: usize,
}

impl AnalysisHistory {
    pub fn new(kv: KvMutator, key: impl Into<String>, max_entries: usize) -> Self {
        Self {
            kv,
            key: key.into(),
            max_entries,
        }
    }

    /// Record an entry. Returns whether it was stored.
    pub async fn save(&self, entry: HistoryEntry) -> bool {
        let value = match serde_json::to_value(&entry) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "Failed to serialize history entry");
                return false;
            }
        };

        match self
            .kv
            .prepend_to_array(&self.key, value, Some(self.max_entries), StorageArea::Sync)
            .await
        {
            Ok(entries) => {
                info!(key = %self.key, entries = entries.len(), "Saved analysis to history");
                true
            }
            Err(e) => {
                warn!(
                    key = %self.key,
                    error = %e,
                    quota = e.is_quota(),
                    "Failed to save history (non-critical)"
                );
                false
            }
        }
    }

    /// Up to `limit` most recent entries, newest first. Malformed entries are skipped.
    pub async fn recent(&self, limit: usize) -> Vec<HistoryEntry> {
        let stored = match self.kv.read(&self.key, StorageArea::Sync).await {
            Ok(Some(serde_json::Value::Array(items))) => items,
            Ok(_) => return Vec::new(),
            Err(e) => {
                warn!(key = %self.key, error = %e, "Failed to read history");
                return Vec::new();
            }
        };

        stored
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .take(limit)
            .collect()
    }
}
