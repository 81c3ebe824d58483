use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::clock::{Clock, duration_ms};

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    expires_at: i64,
}

/// Bounded key/value store with per-entry expiry.
///
/// Expired entries are dropped lazily when read. When full, inserting a new
/// key evicts the entry with the earliest expiry (not strict LRU); the scan is
/// linear, which is fine for the few hundred entries each instance holds.
pub struct TtlCache<V> {
    name: &'static str,
    capacity: usize,
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<String, Entry<V>>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(name: &'static str, capacity: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            name,
            capacity: capacity.max(1),
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry<V>>> {
        // A panic while holding the lock cannot leave an entry half-written.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now_ms();
        let mut entries = self.lock();
        match entries.get(key) {
            Some(entry) if now < entry.expires_at => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Milliseconds left before `key` expires, if it is present and fresh.
    pub fn remaining_ttl(&self, key: &str) -> Option<Duration> {
        let now = self.clock.now_ms();
        let entries = self.lock();
        entries
            .get(key)
            .filter(|entry| now < entry.expires_at)
            .map(|entry| Duration::from_millis((entry.expires_at - now) as u64))
    }

    /// Stores `value` until `now + ttl`, replacing any previous entry for the
    /// key. Returns the key evicted to make room, if any.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) -> Option<String> {
        let key = key.into();
        let expires_at = self.clock.now_ms().saturating_add(duration_ms(ttl));
        let mut entries = self.lock();

        let mut evicted = None;
        if !entries.contains_key(&key) && entries.len() >= self.capacity {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.expires_at)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
                tracing::debug!(cache = self.name, evicted = %oldest, "evicted oldest cache entry");
                evicted = Some(oldest);
            }
        }

        entries.insert(key, Entry { value, expires_at });
        evicted
    }

    pub fn remove(&self, key: &str) -> bool {
        self.lock().remove(key).is_some()
    }

    /// Drops every entry whose key contains `pattern`. Returns how many went.
    pub fn remove_matching(&self, pattern: &str) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|key, _| !key.contains(pattern));
        before - entries.len()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of stored entries, including expired ones not yet read.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
