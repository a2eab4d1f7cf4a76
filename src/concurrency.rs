//! Advisory lock store
//!
//! Serializes critical sections that share a lock name. Locks are cooperative:
//! only callers that go through [`LockStore::with_lock`] are excluded from each
//! other. Different lock names never block one another.
//!
//! When no lock facility is available the critical section runs directly and a
//! warning is logged once. That path gives up mutual exclusion.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Scoped hold on a named lock. Dropping it releases the lock.
pub struct LockGuard {
    _inner: Box<dyn Send>,
}

impl LockGuard {
    pub fn new<G: Send + 'static>(inner: G) -> Self {
        Self {
            _inner: Box::new(inner),
        }
    }
}

/// Host primitive granting exclusive, auto-released locks per name.
#[async_trait]
pub trait LockFacility: Send + Sync {
    /// Wait until `name` is free and take it.
    async fn acquire(&self, name: &str) -> LockGuard;
}

/// In-process lock facility backed by one async mutex per lock name.
///
/// Waiters on the same name are granted the lock in arrival order.
pub struct LocalLockFacility {
    /// Map from lock name to its mutex
    locks: Arc<RwLock<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl LocalLockFacility {
    pub fn new() -> Self {
        Self {
            locks: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn lock_for(&self, name: &str) -> Arc<tokio::sync::Mutex<()>> {
        {
            let map = self.locks.read();
            if let Some(lock) = map.get(name) {
                return lock.clone();
            }
        }

        let mut map = self.locks.write();
        // Double-check: another caller may have created it between the two guards
        map.entry(name.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Number of lock names seen so far.
    pub fn known_locks(&self) -> usize {
        self.locks.read().len()
    }
}

impl Default for LocalLockFacility {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LockFacility for LocalLockFacility {
    async fn acquire(&self, name: &str) -> LockGuard {
        let lock = self.lock_for(name);
        LockGuard::new(lock.lock_owned().await)
    }
}

/// Runs critical sections under named advisory locks.
pub struct LockStore {
    facility: Option<Arc<dyn LockFacility>>,
    warned: AtomicBool,
}

impl LockStore {
    pub fn new(facility: Arc<dyn LockFacility>) -> Self {
        Self {
            facility: Some(facility),
            warned: AtomicBool::new(false),
        }
    }

    /// Lock store using the in-process facility.
    pub fn local() -> Self {
        Self::new(Arc::new(LocalLockFacility::new()))
    }

    /// Lock store for hosts without a lock facility. Critical sections run unguarded.
    pub fn unavailable() -> Self {
        Self {
            facility: None,
            warned: AtomicBool::new(false),
        }
    }

    pub fn is_available(&self) -> bool {
        self.facility.is_some()
    }

    /// Run `critical_section` while holding `lock_name`.
    ///
    /// The lock is released when the section completes, whatever its outcome.
    /// Errors returned by the section are passed through untouched.
    pub async fn with_lock<F, Fut, T>(&self, lock_name: &str, critical_section: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        match &self.facility {
            Some(facility) => {
                let _guard = facility.acquire(lock_name).await;
                debug!(lock_name = %lock_name, "Acquired advisory lock");
                critical_section().await
            }
            None => {
                if !self.warned.swap(true, Ordering::SeqCst) {
                    warn!(
                        lock_name = %lock_name,
                        "Lock facility not available, executing without lock"
                    );
                }
                critical_section().await
            }
        }
    }
}

impl Default for LockStore {
    fn default() -> Self {
        Self::local()
    }
}
