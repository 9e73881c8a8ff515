//! Time-windowed memoization of pipeline results.
//!
//! Entries are keyed by `(operation, symbol)` and expire lazily: an entry is
//! only checked, and replaced, when the same key is requested again. Each key
//! has its own async lock held across the computation, so concurrent misses for
//! one key run the computation once and the rest observe its result. Failed
//! computations are never cached.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::PipelineError;

/// Operation classes sharing a cache TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheOperation {
    Train,
    Predict,
    StockRows,
    SentimentRows,
    LatestPrice,
}

impl CacheOperation {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Train => "train",
            Self::Predict => "predict",
            Self::StockRows => "stock_rows",
            Self::SentimentRows => "sentiment_rows",
            Self::LatestPrice => "latest_price",
        }
    }
}

impl Display for CacheOperation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// TTL per operation class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtls {
    pub train: Duration,
    pub data_read: Duration,
    pub predict: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            train: Duration::from_secs(3600),
            data_read: Duration::from_secs(600),
            predict: Duration::from_secs(300),
        }
    }
}

impl CacheTtls {
    pub const fn for_operation(&self, operation: CacheOperation) -> Duration {
        match operation {
            CacheOperation::Train => self.train,
            CacheOperation::Predict => self.predict,
            CacheOperation::StockRows | CacheOperation::SentimentRows | CacheOperation::LatestPrice => {
                self.data_read
            }
        }
    }

    /// Whether `train > data_read > predict` holds.
    pub fn is_ordered(&self) -> bool {
        self.train > self.data_read && self.data_read > self.predict
    }
}

#[derive(Debug)]
struct CacheEntry {
    value: serde_json::Value,
    created_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant) -> bool {
        now.duration_since(self.created_at) < self.ttl
    }
}

type CacheKey = (CacheOperation, String);
type Slot = Arc<Mutex<Option<CacheEntry>>>;

/// Per-key memoization with operation-specific TTLs.
#[derive(Debug, Clone)]
pub struct PredictionCache {
    ttls: CacheTtls,
    slots: Arc<RwLock<HashMap<CacheKey, Slot>>>,
}

impl Default for PredictionCache {
    fn default() -> Self {
        Self::new(CacheTtls::default())
    }
}

impl PredictionCache {
    pub fn new(ttls: CacheTtls) -> Self {
        Self {
            ttls,
            slots: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn ttls(&self) -> CacheTtls {
        self.ttls
    }

    async fn slot(&self, key: CacheKey) -> Slot {
        if let Some(slot) = self.slots.read().await.get(&key) {
            return Arc::clone(slot);
        }

        let mut slots = self.slots.write().await;
        Arc::clone(slots.entry(key).or_default())
    }

    // Runs under the map's write lock, which `slot` also needs to hand out a
    // clone, so nobody can pick up the slot between the check and the removal.
    async fn forget_if_unused(&self, key: &CacheKey, slot: &Slot) {
        let mut slots = self.slots.write().await;
        let unused = slots.get(key).is_some_and(|current| Arc::ptr_eq(current, slot))
            && Arc::strong_count(slot) == 2
            && slot.try_lock().is_ok_and(|entry| entry.is_none());
        if unused {
            slots.remove(key);
        }
    }

    /// Return the cached value for `(operation, symbol)`, or run `compute` and
    /// cache its successful result for the operation's TTL.
    pub async fn get_or_compute<T, F, Fut>(
        &self,
        operation: CacheOperation,
        symbol: &str,
        compute: F,
    ) -> Result<T, PipelineError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, PipelineError>>,
    {
        let key = (operation, symbol.to_owned());
        let slot = self.slot(key.clone()).await;
        let mut entry = slot.lock().await;

        if let Some(cached) = entry.as_ref().filter(|cached| cached.is_fresh(Instant::now())) {
            match serde_json::from_value(cached.value.clone()) {
                Ok(value) => {
                    debug!(%operation, symbol, "cache hit");
                    return Ok(value);
                }
                Err(error) => warn!(%operation, symbol, %error, "discarding undecodable cache entry"),
            }
        }

        debug!(%operation, symbol, "cache miss");
        let value = match compute().await {
            Ok(value) => value,
            Err(error) => {
                let empty = entry.is_none();
                drop(entry);
                if empty {
                    self.forget_if_unused(&key, &slot).await;
                }
                return Err(error);
            }
        };
        match serde_json::to_value(&value) {
            Ok(json) => {
                *entry = Some(CacheEntry {
                    value: json,
                    created_at: Instant::now(),
                    ttl: self.ttls.for_operation(operation),
                });
            }
            Err(error) => warn!(%operation, symbol, %error, "result not cacheable"),
        }

        Ok(value)
    }

    /// Number of keys that currently hold a value, fresh or stale.
    pub async fn len(&self) -> usize {
        let slots: Vec<Slot> = self.slots.read().await.values().cloned().collect();
        let mut count = 0;
        for slot in slots {
            if slot.lock().await.is_some() {
                count += 1;
            }
        }
        count
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
