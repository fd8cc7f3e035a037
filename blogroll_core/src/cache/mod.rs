//! Short-lived in-process cache.
//!
//! Entries expire a fixed time after they were stored and are never
//! invalidated by writes elsewhere, so readers can observe data up to one TTL
//! old.

use std::{
    collections::HashMap,
    future::Future,
    hash::Hash,
    sync::Arc,
    time::{Duration, Instant},
};

use tokio::sync::RwLock;

mod clock;

pub use clock::{Clock, ManualClock, SystemClock};

/// Keys used by the services in this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Ordered post list behind the global feed.
    GlobalFeed,
}

struct Entry<V> {
    value: V,
    /// `None` when the TTL reaches past what `Instant` can represent.
    expires_at: Option<Instant>,
}

impl<V> Entry<V> {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |expires_at| expires_at > now)
    }
}

pub struct TtlCache<K, V> {
    entries: RwLock<HashMap<K, Entry<V>>>,
    clock: Arc<dyn Clock>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
    V: Clone,
{
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    pub fn with_system_clock() -> Self {
        Self::new(Arc::new(SystemClock))
    }

    /// Return the live value for `key`, if any.
    pub async fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone())
    }

    /// Return the live value for `key`, or run `producer` and keep its result
    /// for `ttl`.
    ///
    /// The producer runs under the write lock, so concurrent misses on the
    /// same cache wait for a single run. Producer errors are returned as-is
    /// and nothing is stored.
    pub async fn get_or_populate<F, Fut, E>(
        &self,
        key: K,
        ttl: Duration,
        producer: F,
    ) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(&key).await {
            tracing::debug!(?key, "cache hit");
            return Ok(value);
        }

        let mut entries = self.entries.write().await;

        // Someone else may have populated while we waited for the lock.
        let now = self.clock.now();
        if let Some(entry) = entries.get(&key).filter(|entry| entry.is_live(now)) {
            tracing::debug!(?key, "cache hit after wait");
            return Ok(entry.value.clone());
        }

        tracing::debug!(?key, ttl_ms = ttl.as_millis() as u64, "cache miss");
        let value = producer().await?;

        // Expiry counts from when the value was produced.
        let expires_at = self.clock.now().checked_add(ttl);
        if expires_at.is_none() {
            tracing::warn!(?key, "ttl out of range, entry never expires");
        }
        entries.insert(
            key,
            Entry {
                value: value.clone(),
                expires_at,
            },
        );

        Ok(value)
    }

    pub async fn invalidate(&self, key: &K) {
        self.entries.write().await.remove(key);
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}
