//! Batched by-id lookups.
//!
//! Every [`BatchedLookup::lookup_many`] call made before the scheduled flush
//! joins the same batch for its resource. The flush issues a single
//! `get_many` with the ordered union of requested ids and hands every caller
//! its own ids back, in its own order.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::sync::oneshot;

use adminkit_common::logging::redact_payload;
use adminkit_model::{Identifier, Record};

use crate::error::{DataError, Result};
use crate::provider::{DataProvider, GetManyParams};
use crate::scheduler::Scheduler;

/// One caller's share of a batch.
type LookupResult = Result<Vec<Option<Record>>>;

struct Waiter {
    ids: Vec<Identifier>,
    tx: oneshot::Sender<LookupResult>,
}

#[derive(Default)]
struct PendingBatch {
    ids: Vec<Identifier>,
    seen: HashSet<Identifier>,
    waiters: Vec<Waiter>,
}

impl PendingBatch {
    fn enqueue(&mut self, ids: &[Identifier], tx: oneshot::Sender<LookupResult>) {
        for id in ids {
            if self.seen.insert(id.clone()) {
                self.ids.push(id.clone());
            }
        }
        self.waiters.push(Waiter {
            ids: ids.to_vec(),
            tx,
        });
    }
}

struct BatchInner {
    provider: Arc<dyn DataProvider>,
    scheduler: Arc<dyn Scheduler>,
    delay: Duration,
    pending: Mutex<HashMap<String, PendingBatch>>,
}

/// Coalesces by-id lookups into one `get_many` per resource per tick.
#[derive(Clone)]
pub struct BatchedLookup {
    inner: Arc<BatchInner>,
}

impl std::fmt::Debug for BatchedLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchedLookup")
            .field("provider", &self.inner.provider)
            .field("delay", &self.inner.delay)
            .field("pending_resources", &self.inner.lock().len())
            .finish()
    }
}

impl BatchedLookup {
    /// Create a lookup layer flushing on the next tick.
    pub fn new(provider: Arc<dyn DataProvider>, scheduler: Arc<dyn Scheduler>) -> Self {
        Self::with_delay(provider, scheduler, Duration::ZERO)
    }

    /// Create a lookup layer flushing `delay` after the first request of a batch.
    pub fn with_delay(
        provider: Arc<dyn DataProvider>,
        scheduler: Arc<dyn Scheduler>,
        delay: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(BatchInner {
                provider,
                scheduler,
                delay,
                pending: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// The provider behind this layer.
    pub fn provider(&self) -> &Arc<dyn DataProvider> {
        &self.inner.provider
    }

    /// Look up `ids` in `resource`.
    ///
    /// The request joins the current batch immediately; the returned future
    /// resolves after the flush with one entry per requested id, `None` where
    /// the backend returned no record. An empty id list resolves at once
    /// without a request.
    pub fn lookup_many(&self, resource: &str, ids: &[Identifier]) -> BoxFuture<'static, LookupResult> {
        if ids.is_empty() {
            return Box::pin(futures_util::future::ready(Ok(Vec::new())));
        }

        let (tx, rx) = oneshot::channel();
        let first = {
            let mut pending = self.inner.lock();
            let batch = pending.entry(resource.to_string()).or_default();
            let first = batch.waiters.is_empty();
            batch.enqueue(ids, tx);
            first
        };
        if first {
            let inner = Arc::clone(&self.inner);
            let flushed = resource.to_string();
            self.inner
                .scheduler
                .schedule(self.inner.delay, Box::new(move || inner.flush(&flushed)));
        }

        let resource = resource.to_string();
        Box::pin(async move {
            rx.await
                .unwrap_or_else(|_| Err(DataError::Cancelled { resource }))
        })
    }

    /// Number of resources with a batch waiting to flush.
    pub fn pending_resources(&self) -> usize {
        self.inner.lock().len()
    }
}

impl BatchInner {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, PendingBatch>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn flush(self: Arc<Self>, resource: &str) {
        let Some(batch) = self.lock().remove(resource) else {
            return;
        };
        let resource = resource.to_string();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { self.deliver(&resource, batch).await });
            }
            Err(_) => {
                tracing::warn!(%resource, "No runtime to flush batched lookup, cancelling");
                for waiter in batch.waiters {
                    let _ = waiter.tx.send(Err(DataError::Cancelled {
                        resource: resource.clone(),
                    }));
                }
            }
        }
    }

    async fn deliver(&self, resource: &str, batch: PendingBatch) {
        let PendingBatch { ids, waiters, .. } = batch;
        tracing::debug!(resource, ids = ids.len(), waiters = waiters.len(), "Flushing batched lookup");

        match self.provider.get_many(resource, GetManyParams::new(ids)).await {
            Ok(result) => {
                tracing::trace!(
                    resource,
                    records = %redact_payload(&result.data),
                    "Batched lookup returned"
                );
                let by_id: HashMap<Identifier, Record> = result
                    .data
                    .into_iter()
                    .map(|record| (record.id().clone(), record))
                    .collect();
                for waiter in waiters {
                    let records = waiter.ids.iter().map(|id| by_id.get(id).cloned()).collect();
                    let _ = waiter.tx.send(Ok(records));
                }
            }
            Err(error) => {
                tracing::warn!(resource, %error, "Batched lookup failed");
                for waiter in waiters {
                    let _ = waiter.tx.send(Err(error.clone()));
                }
            }
        }
    }
}
