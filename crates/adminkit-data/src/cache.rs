//! Single-flight query cache.
//!
//! Requests are keyed by resource plus a fingerprint of their parameters.
//! Concurrent identical requests share one provider call; later identical
//! requests are served from the cache until the resource is invalidated.
//! Failures are delivered to every waiter but never cached.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::oneshot;

use crate::error::{DataError, Result};

// =============================================================================
// CACHE KEY
// =============================================================================

/// Resource plus parameter fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    resource: String,
    fingerprint: String,
}

impl CacheKey {
    /// Key for a `kind` request (`getList`, `getMany`, ...) with `params`.
    pub fn new(resource: &str, kind: &str, params: &impl Serialize) -> Self {
        let params = serde_json::to_string(params).unwrap_or_else(|e| e.to_string());
        Self {
            resource: resource.to_string(),
            fingerprint: format!("{kind}:{params}"),
        }
    }

    /// Resource the request targets.
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Parameter fingerprint.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

// =============================================================================
// CACHE
// =============================================================================

enum Slot<T> {
    /// A provider call is in flight; waiters receive its result.
    Loading(Vec<oneshot::Sender<Result<T>>>),
    Ready(T),
}

type Slots<T> = Mutex<HashMap<CacheKey, Slot<T>>>;

/// Single-flight cache of query results.
pub struct QueryCache<T> {
    slots: Arc<Slots<T>>,
}

impl<T> Clone for QueryCache<T> {
    fn clone(&self) -> Self {
        Self {
            slots: Arc::clone(&self.slots),
        }
    }
}

impl<T> Default for QueryCache<T> {
    fn default() -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<T> std::fmt::Debug for QueryCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCache")
            .field("entries", &lock(&self.slots).len())
            .finish()
    }
}

impl<T: Clone> QueryCache<T> {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached value for `key`, join an in-flight request for it,
    /// or run `fetch` and share its result.
    pub async fn get_or_fetch<F, Fut>(&self, key: CacheKey, fetch: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let waiter = {
            let mut slots = lock(&self.slots);
            match slots.get_mut(&key) {
                Some(Slot::Ready(value)) => {
                    tracing::trace!(resource = %key.resource, "Query cache hit");
                    return Ok(value.clone());
                }
                Some(Slot::Loading(waiters)) => {
                    let (tx, rx) = oneshot::channel();
                    waiters.push(tx);
                    Some(rx)
                }
                None => {
                    slots.insert(key.clone(), Slot::Loading(Vec::new()));
                    None
                }
            }
        };

        if let Some(rx) = waiter {
            tracing::trace!(resource = %key.resource, "Joining in-flight query");
            return rx.await.unwrap_or_else(|_| {
                Err(DataError::Cancelled {
                    resource: key.resource.clone(),
                })
            });
        }

        let mut guard = LoadGuard {
            slots: &self.slots,
            key: &key,
            armed: true,
        };
        let result = fetch().await;
        guard.armed = false;

        let waiters = {
            let mut slots = lock(&self.slots);
            let waiters = match slots.remove(&key) {
                Some(Slot::Loading(waiters)) => waiters,
                Some(ready) => {
                    slots.insert(key.clone(), ready);
                    Vec::new()
                }
                None => Vec::new(),
            };
            if let Ok(value) = &result {
                slots.insert(key.clone(), Slot::Ready(value.clone()));
            }
            waiters
        };
        if let Err(error) = &result {
            tracing::warn!(resource = %key.resource, %error, waiters = waiters.len(), "Query failed");
        }
        for tx in waiters {
            let _ = tx.send(result.clone());
        }
        result
    }

    /// Cached value for `key`, if a request for it completed successfully.
    pub fn get(&self, key: &CacheKey) -> Option<T> {
        match lock(&self.slots).get(key) {
            Some(Slot::Ready(value)) => Some(value.clone()),
            _ => None,
        }
    }

    /// Whether a request for `key` is in flight.
    pub fn is_loading(&self, key: &CacheKey) -> bool {
        matches!(lock(&self.slots).get(key), Some(Slot::Loading(_)))
    }

    /// Drop cached results of `resource`. In-flight requests are unaffected.
    /// Returns the number of entries dropped.
    pub fn invalidate_resource(&self, resource: &str) -> usize {
        let mut slots = lock(&self.slots);
        let before = slots.len();
        slots.retain(|key, slot| key.resource != resource || matches!(slot, Slot::Loading(_)));
        let dropped = before - slots.len();
        tracing::debug!(resource, dropped, "Invalidated cached queries");
        dropped
    }

    /// Number of entries, cached or in flight.
    pub fn len(&self) -> usize {
        lock(&self.slots).len()
    }

    /// Whether the cache holds nothing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn lock<T>(slots: &Slots<T>) -> MutexGuard<'_, HashMap<CacheKey, Slot<T>>> {
    slots.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Releases waiters when the leading request is dropped before completing.
struct LoadGuard<'a, T> {
    slots: &'a Slots<T>,
    key: &'a CacheKey,
    armed: bool,
}

impl<T> Drop for LoadGuard<'_, T> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut slots = lock(self.slots);
        if matches!(slots.get(self.key), Some(Slot::Loading(_))) {
            // Dropping the senders wakes every waiter with `Cancelled`.
            slots.remove(self.key);
        }
    }
}
