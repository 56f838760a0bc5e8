//! Short-lived cache for rendered pages.

use std::{
    collections::HashMap,
    hash::Hash,
    sync::{Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};
use tracing::debug;

/// Entries kept before the oldest one is evicted.
pub const DEFAULT_MAX_ENTRIES: usize = 256;

#[derive(Clone, Debug)]
struct CacheEntry<V> {
    value: V,
    created_at: Instant,
}

/// Rendered pages keyed by `K`, usually the resolved page number.
///
/// A zero TTL turns the cache off. Expired entries are swept on insert and
/// the map never holds more than `max_entries`.
#[derive(Debug)]
pub struct PageCache<K, V> {
    ttl: Duration,
    max_entries: usize,
    entries: Mutex<HashMap<K, CacheEntry<V>>>,
}

impl<K: Clone + Eq + Hash, V: Clone> PageCache<K, V> {
    /// `max_entries` of zero is treated as one.
    #[must_use]
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries: max_entries.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<K, CacheEntry<V>>> {
        // Entries are replaced whole, a poisoned map is still consistent.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_fresh(&self, entry: &CacheEntry<V>, now: Instant) -> bool {
        now.saturating_duration_since(entry.created_at) < self.ttl
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    fn get_at(&self, key: &K, now: Instant) -> Option<V> {
        if !self.is_enabled() {
            return None;
        }

        let mut entries = self.entries();
        let entry = entries.get(key)?;

        if self.is_fresh(entry, now) {
            Some(entry.value.clone())
        } else {
            entries.remove(key);
            None
        }
    }

    pub fn insert(&self, key: K, value: V) {
        self.insert_at(key, value, Instant::now());
    }

    fn insert_at(&self, key: K, value: V, now: Instant) {
        if !self.is_enabled() {
            return;
        }

        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, entry| self.is_fresh(entry, now));
        if entries.len() < before {
            debug!(removed = before - entries.len(), "Swept expired cache entries");
        }

        if entries.len() >= self.max_entries && !entries.contains_key(&key) {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.created_at)
                .map(|(key, _)| key.clone());
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
            }
        }

        let entry = CacheEntry {
            value,
            created_at: now,
        };
        entries.insert(key, entry);
    }

    pub fn clear(&self) {
        self.entries().clear();
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries().len()
    }
}
