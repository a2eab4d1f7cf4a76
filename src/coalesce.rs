//! Request coalescing with a TTL cache.
//!
//! For each key at most one fetch is in flight. Callers arriving while it runs
//! await the same shared result, and successful results are cached for the
//! TTL. Failures never reach callers: every error maps to a typed fallback,
//! and the [`Lookup`] records how the value was obtained.

use crate::error::FetchError;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Where a looked-up value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupSource {
    /// Served from cache within TTL
    Cache,
    /// Fetched successfully
    Fetched,
    /// Backend had no record; fallback used
    NotFound,
    /// Backend rejected the credentials; fallback used
    Unauthorized,
    /// Any other failure; fallback used
    Failed,
}

/// Result of a coalesced lookup. Always carries a usable value.
#[derive(Debug, Clone)]
pub struct Lookup<T> {
    pub value: T,
    pub source: LookupSource,
    pub error: Option<String>,
}

impl<T> Lookup<T> {
    fn hit(value: T, source: LookupSource) -> Self {
        Self {
            value,
            source,
            error: None,
        }
    }

    /// Whether the value is a fallback rather than a backend record.
    pub fn is_fallback(&self) -> bool {
        !matches!(self.source, LookupSource::Cache | LookupSource::Fetched)
    }

    /// Whether the lookup failed (as opposed to finding no record).
    pub fn is_error(&self) -> bool {
        matches!(self.source, LookupSource::Unauthorized | LookupSource::Failed)
    }
}

type InFlight<T> = Shared<BoxFuture<'static, Lookup<T>>>;

struct CacheEntry<T> {
    value: T,
    fetched_at: Instant,
}

struct Slot<T> {
    cached: Option<CacheEntry<T>>,
    pending: Option<InFlight<T>>,
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self {
            cached: None,
            pending: None,
        }
    }
}

/// Per-key cache plus in-flight tracking.
pub struct Coalescer<T> {
    ttl: Duration,
    slots: Arc<Mutex<HashMap<String, Slot<T>>>>,
}

impl<T> Coalescer<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Resolve `key`, sharing one fetch among concurrent callers.
    ///
    /// `fetch` is only invoked when there is neither a fresh cached value nor
    /// a fetch already in flight. `fallback` supplies the value returned when
    /// the fetch fails.
    pub async fn get<F, Fut, D>(&self, key: &str, fetch: F, fallback: D) -> Lookup<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
        D: Fn() -> T + Send + Sync + 'static,
    {
        let mut starter = None;
        let in_flight = {
            let mut slots = self.slots.lock();
            let slot = slots.entry(key.to_string()).or_default();

            if let Some(entry) = &slot.cached {
                if entry.fetched_at.elapsed() < self.ttl {
                    debug!(key = %key, "Using cached value");
                    return Lookup::hit(entry.value.clone(), LookupSource::Cache);
                }
            }

            match &slot.pending {
                Some(pending) => {
                    debug!(key = %key, "Reusing pending request");
                    pending.clone()
                }
                None => {
                    // The fetch future is handed over once the slot lock is released.
                    let (tx, rx) = oneshot::channel::<BoxFuture<'static, Result<T, FetchError>>>();
                    let deferred = async move {
                        match rx.await {
                            Ok(fetch) => fetch.await,
                            Err(_) => Err(FetchError::Transport("fetch was never started".into())),
                        }
                    };
                    let shared = self.start_fetch(key, deferred, Arc::new(fallback));
                    slot.pending = Some(shared.clone());
                    starter = Some(tx);
                    shared
                }
            }
        };

        if let Some(tx) = starter {
            let _ = tx.send(fetch().boxed());
        }

        in_flight.await
    }

    fn start_fetch<Fut, D>(&self, key: &str, fetch: Fut, fallback: Arc<D>) -> InFlight<T>
    where
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
        D: Fn() -> T + Send + Sync + 'static,
    {
        let task_slots = Arc::clone(&self.slots);
        let task_key = key.to_string();
        let task_fallback = Arc::clone(&fallback);

        // Runs on its own task so the fetch completes and clears its pending
        // marker even if every caller stops waiting.
        let handle = tokio::spawn(async move {
            let lookup = match fetch.await {
                Ok(value) => Lookup::hit(value, LookupSource::Fetched),
                Err(FetchError::NotFound) => {
                    info!(key = %task_key, "No record found, using default");
                    Lookup::hit(task_fallback(), LookupSource::NotFound)
                }
                Err(FetchError::Unauthorized) => {
                    error!(key = %task_key, "Lookup unauthorized, using default");
                    Lookup {
                        value: task_fallback(),
                        source: LookupSource::Unauthorized,
                        error: Some(FetchError::Unauthorized.to_string()),
                    }
                }
                Err(err) => {
                    error!(key = %task_key, error = %err, "Lookup failed, using default");
                    Lookup {
                        value: task_fallback(),
                        source: LookupSource::Failed,
                        error: Some(err.to_string()),
                    }
                }
            };

            let mut slots = task_slots.lock();
            if let Some(slot) = slots.get_mut(&task_key) {
                slot.pending = None;
                if lookup.source == LookupSource::Fetched {
                    slot.cached = Some(CacheEntry {
                        value: lookup.value.clone(),
                        fetched_at: Instant::now(),
                    });
                }
            }
            lookup
        });

        let slots = Arc::clone(&self.slots);
        let key = key.to_string();
        async move {
            match handle.await {
                Ok(lookup) => lookup,
                Err(join_err) => {
                    warn!(key = %key, error = %join_err, "Fetch task aborted, using default");
                    if let Some(slot) = slots.lock().get_mut(&key) {
                        slot.pending = None;
                    }
                    Lookup {
                        value: fallback(),
                        source: LookupSource::Failed,
                        error: Some(join_err.to_string()),
                    }
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Install a value fetched `age` ago, e.g. when restoring a persisted cache.
    ///
    /// Values already older than the TTL are ignored. Returns whether the value was kept.
    pub fn seed(&self, key: &str, value: T, age: Duration) -> bool {
        if age >= self.ttl {
            return false;
        }
        let now = Instant::now();
        let fetched_at = now.checked_sub(age).unwrap_or(now);
        let mut slots = self.slots.lock();
        slots.entry(key.to_string()).or_default().cached = Some(CacheEntry { value, fetched_at });
        true
    }

    /// Drop the cached value for `key`. An in-flight fetch is left alone.
    pub fn invalidate(&self, key: &str) {
        if let Some(slot) = self.slots.lock().get_mut(key) {
            slot.cached = None;
        }
    }

    /// Drop every cached value.
    pub fn clear(&self) {
        for slot in self.slots.lock().values_mut() {
            slot.cached = None;
        }
    }

    /// Whether a fetch for `key` is currently outstanding.
    pub fn is_pending(&self, key: &str) -> bool {
        self.slots
            .lock()
            .get(key)
            .map(|slot| slot.pending.is_some())
            .unwrap_or(false)
    }
}
