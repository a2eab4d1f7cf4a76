//! Error types for the persistent-state layer.

use crate::types::StorageArea;
use thiserror::Error;

/// Errors raised by storage backends and the KV mutator.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to read '{key}' from {area} storage: {message}")]
    Read {
        key: String,
        area: StorageArea,
        message: String,
    },

    #[error("failed to write '{key}' to {area} storage: {message}")]
    Write {
        key: String,
        area: StorageArea,
        message: String,
    },

    #[error("QUOTA_BYTES_PER_ITEM quota exceeded for '{key}' in {area} storage ({size} > {limit} bytes)")]
    QuotaExceeded {
        key: String,
        area: StorageArea,
        size: usize,
        limit: usize,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("critical section for '{0}' did not complete")]
    Task(String),
}

impl StorageError {
    /// Whether this error reports a quota/size rejection.
    ///
    /// Only the backend's own message is inspected, never the key name.
    pub fn is_quota(&self) -> bool {
        match self {
            StorageError::QuotaExceeded { .. } => true,
            StorageError::Write { message, .. } => is_quota_message(message),
            StorageError::Backend(message) => is_quota_message(message),
            StorageError::Read { .. } | StorageError::Serialization(_) | StorageError::Task(_) => {
                false
            }
        }
    }
}

/// Quota errors are recognised by message substring.
pub fn is_quota_message(message: &str) -> bool {
    message.contains("quota") || message.contains("QUOTA") || message.contains("exceeded")
}

impl From<sled::Error> for StorageError {
    fn from(err: sled::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}

/// Errors produced by a wrapped remote lookup.
///
/// These never escape the coalescer; they only decide which fallback is used
/// and how it is reported.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    #[error("Unauthorized - Invalid API key")]
    Unauthorized,

    #[error("no record found")]
    NotFound,

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("subscription backend not configured: {0}")]
    NotConfigured(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            FetchError::Decode(err.to_string())
        } else {
            FetchError::Transport(err.to_string())
        }
    }
}

/// Business errors of the agent registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Guardian {0} not found")]
    NotFound(String),

    #[error("Guardian {0} is not operational")]
    NotOperational(String),

    #[error("Invalid amplification factor {0} (must be a positive finite number)")]
    InvalidFactor(f64),

    #[error("Guardian {name} cannot {action} from state {from}")]
    InvalidTransition {
        name: String,
        from: String,
        action: &'static str,
    },

    #[error("Failed to {action} {name}: {source}")]
    Persistence {
        name: String,
        action: &'static str,
        #[source]
        source: StorageError,
    },
}

/// Configuration and startup errors.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Config(#[from] config::ConfigError),

    /// A command ran but reported failure
    #[error("{0}")]
    CommandFailed(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
