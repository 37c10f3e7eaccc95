//! Batched lookups.
//!
//! Callers enqueue single keys; a background task flushes the queue as one
//! fetch every interval, or early once `max_batch` keys are waiting.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::{Mutex, Notify, oneshot};
use tracing::{debug, warn};
use uuid::Uuid;

use verdant_core::error::AppError;
use verdant_core::result::AppResult;
use verdant_database::traits::VegetableRepository;
use verdant_entity::vegetable::VegetableSummary;

/// Fetches many values in one round trip.
#[async_trait]
pub trait BatchFetch<K, V>: Send + Sync + 'static {
    /// Fetch the values of `keys`. Keys without a value are omitted.
    async fn fetch(&self, keys: Vec<K>) -> AppResult<HashMap<K, V>>;
}

type Waiter<K, V> = (K, oneshot::Sender<AppResult<Option<V>>>);

struct Inner<K, V> {
    queue: Mutex<Vec<Waiter<K, V>>>,
    flush_now: Notify,
    max_batch: usize,
}

/// Coalesces individual lookups into batched fetches.
pub struct BatchLoader<K, V> {
    inner: Arc<Inner<K, V>>,
}

impl<K, V> std::fmt::Debug for BatchLoader<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchLoader")
            .field("max_batch", &self.inner.max_batch)
            .finish()
    }
}

impl<K, V> BatchLoader<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Start a loader and its flush task on the current runtime.
    ///
    /// The task stops once the loader is dropped.
    pub fn spawn(fetcher: Arc<dyn BatchFetch<K, V>>, interval: Duration, max_batch: usize) -> Self {
        let inner = Arc::new(Inner {
            queue: Mutex::new(Vec::new()),
            flush_now: Notify::new(),
            max_batch: max_batch.max(1),
        });
        tokio::spawn(run(Arc::downgrade(&inner), fetcher, interval));
        Self { inner }
    }

    /// Look up one key.
    pub async fn load(&self, key: K) -> AppResult<Option<V>> {
        let (tx, rx) = oneshot::channel();
        let queued = {
            let mut queue = self.inner.queue.lock().await;
            queue.push((key, tx));
            queue.len()
        };
        if queued >= self.inner.max_batch {
            self.inner.flush_now.notify_one();
        }
        rx.await
            .map_err(|_| AppError::unknown("Batch loader stopped before answering"))?
    }

    /// Look up several keys, keeping the values found in key order.
    pub async fn load_many(&self, keys: impl IntoIterator<Item = K>) -> AppResult<Vec<V>> {
        let results = join_all(keys.into_iter().map(|key| self.load(key))).await;
        let mut values = Vec::with_capacity(results.len());
        for result in results {
            if let Some(value) = result? {
                values.push(value);
            }
        }
        Ok(values)
    }
}

async fn run<K, V>(weak: Weak<Inner<K, V>>, fetcher: Arc<dyn BatchFetch<K, V>>, interval: Duration)
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    let mut ticker = tokio::time::interval(interval);
    loop {
        let Some(inner) = weak.upgrade() else {
            break;
        };
        tokio::select! {
            _ = ticker.tick() => {}
            _ = inner.flush_now.notified() => {}
        }

        let batch = std::mem::take(&mut *inner.queue.lock().await);
        if batch.is_empty() {
            continue;
        }
        flush(fetcher.as_ref(), batch).await;
    }
    debug!("Batch loader stopped");
}

async fn flush<K, V>(fetcher: &dyn BatchFetch<K, V>, batch: Vec<Waiter<K, V>>)
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    let mut keys: Vec<K> = Vec::with_capacity(batch.len());
    for (key, _) in &batch {
        if !keys.contains(key) {
            keys.push(key.clone());
        }
    }
    debug!(waiters = batch.len(), keys = keys.len(), "Flushing batch");

    match fetcher.fetch(keys).await {
        Ok(values) => {
            for (key, tx) in batch {
                let _ = tx.send(Ok(values.get(&key).cloned()));
            }
        }
        Err(e) => {
            warn!(error = %e, "Batched fetch failed");
            for (_, tx) in batch {
                let _ = tx.send(Err(e.clone()));
            }
        }
    }
}

/// Batched lookup of vegetable summaries by id.
#[derive(Debug, Clone)]
pub struct VegetableSummaryFetch {
    vegetables: Arc<dyn VegetableRepository>,
}

impl VegetableSummaryFetch {
    /// Creates a fetcher over a vegetable repository.
    pub fn new(vegetables: Arc<dyn VegetableRepository>) -> Self {
        Self { vegetables }
    }
}

#[async_trait]
impl BatchFetch<Uuid, VegetableSummary> for VegetableSummaryFetch {
    async fn fetch(&self, keys: Vec<Uuid>) -> AppResult<HashMap<Uuid, VegetableSummary>> {
        let summaries = self.vegetables.find_summaries(&keys).await?;
        Ok(summaries.into_iter().map(|s| (s.id, s)).collect())
    }
}
