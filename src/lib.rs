//! Guardian Core: concurrency-safe persistent state for an ephemeral worker
//!
//! The process hosting this crate may be torn down between any two operations,
//! and several async handlers may touch the same durable state at once. The
//! core provides:
//!
//! - an advisory lock store serializing critical sections by name ([`concurrency`])
//! - atomic read-modify-write primitives over quota-limited storage ([`storage`])
//! - a request coalescer with a TTL cache that always fails open ([`coalesce`])
//! - subscription lookups and the request admission policy ([`subscription`])
//! - a registry of agent state machines rebuilt from storage on start ([`agent`])

pub mod agent;
pub mod coalesce;
pub mod concurrency;
pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod storage;
pub mod subscription;
pub mod tooling;
pub mod types;

pub use context::CoreContext;
pub use error::{ApiError, FetchError, RegistryError, StorageError};
pub use types::StorageArea;
