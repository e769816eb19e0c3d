//! Local Store - bounded in-process cache tier
//!
//! A single-lock map with a hard byte ceiling.
//!
//! # Design
//!
//! - One `parking_lot::Mutex` serializes reads (access bookkeeping, lazy
//!   expiry), writes, invalidation and GC, so eviction never races with the
//!   insertion it is making room for
//! - LRU eviction in batches: the least recently accessed 25% of entries (at
//!   least one) are dropped per pass until the new entry fits
//! - Lazy expiry on read plus a periodic sweep driven by the garbage collector

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::clock::Clock;
use super::compression::CompressionAlgorithm;
use super::entry::{CacheEntry, CacheKey};
use super::metrics::{CacheCounter, CacheMetrics};
use super::policy::CachePolicy;
use super::DEFAULT_MAX_CACHE_SIZE_BYTES;
use crate::error::{Error, Result};

/// Local store configuration
#[derive(Debug, Clone)]
pub struct LocalStoreConfig {
    /// Maximum total payload bytes
    pub max_size_bytes: u64,
    /// Share of entries dropped per eviction pass
    pub eviction_fraction: f64,
}

impl Default for LocalStoreConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: DEFAULT_MAX_CACHE_SIZE_BYTES,
            eviction_fraction: 0.25,
        }
    }
}

#[derive(Default)]
struct State {
    map: HashMap<String, CacheEntry>,
    total_bytes: u64,
    seq: u64,
}

impl State {
    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let removed = self.map.remove(key)?;
        self.total_bytes -= removed.size_bytes();
        Some(removed)
    }

    fn remove_where(&mut self, mut pred: impl FnMut(&CacheEntry) -> bool) -> usize {
        let mut freed = 0u64;
        let before = self.map.len();
        self.map.retain(|_, entry| {
            if pred(entry) {
                freed += entry.size_bytes();
                false
            } else {
                true
            }
        });
        self.total_bytes -= freed;
        before - self.map.len()
    }
}

/// Bounded in-process cache tier
pub struct LocalStore {
    state: Mutex<State>,
    config: LocalStoreConfig,
    clock: Arc<dyn Clock>,
    metrics: Arc<CacheMetrics>,
}

impl LocalStore {
    /// Create a store with the given configuration
    pub fn new(config: LocalStoreConfig, clock: Arc<dyn Clock>, metrics: Arc<CacheMetrics>) -> Self {
        Self {
            state: Mutex::new(State::default()),
            config,
            clock,
            metrics,
        }
    }

    /// Look up an entry, recording the access.
    ///
    /// Expired entries are deleted inline and reported as a miss.
    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        let now = self.clock.now();
        let mut state = self.state.lock();

        let expired = match state.map.get(key.as_str()) {
            None => {
                drop(state);
                self.metrics.record(CacheCounter::Miss);
                return None;
            }
            Some(entry) => entry.is_expired(now),
        };

        if expired {
            state.remove(key.as_str());
            drop(state);
            self.metrics.record(CacheCounter::Expiration);
            self.metrics.record(CacheCounter::Miss);
            return None;
        }

        let seq = state.next_seq();
        let entry = state.map.get_mut(key.as_str()).map(|entry| {
            entry.record_access(now, seq);
            entry.clone()
        });
        drop(state);
        self.metrics.record(CacheCounter::Hit);
        entry
    }

    /// Look up an entry without touching LRU bookkeeping or counters
    pub fn peek(&self, key: &CacheKey) -> Option<CacheEntry> {
        let now = self.clock.now();
        self.state
            .lock()
            .map
            .get(key.as_str())
            .filter(|entry| !entry.is_expired(now))
            .cloned()
    }

    /// Store a payload under `key` using `policy` for its lifetime
    pub fn set(
        &self,
        key: CacheKey,
        payload: Bytes,
        compression: CompressionAlgorithm,
        policy: &CachePolicy,
    ) -> Result<()> {
        let entry = CacheEntry::new(key, payload, compression, policy, self.clock.now());
        self.put(entry, policy)
    }

    /// Insert a prepared entry, enforcing the policy's entry ceiling
    pub fn put(&self, entry: CacheEntry, policy: &CachePolicy) -> Result<()> {
        if let Some(limit) = policy.max_entry_size_bytes {
            if entry.size_bytes() > limit {
                return Err(Error::EntryTooLarge {
                    key: entry.key().to_string(),
                    size: entry.size_bytes(),
                    limit,
                });
            }
        }
        self.insert(entry)
    }

    /// Insert a prepared entry, keeping its timestamps.
    ///
    /// Evicts least recently used entries until the entry fits; fails only if
    /// the entry alone exceeds the store capacity.
    pub fn insert(&self, mut entry: CacheEntry) -> Result<()> {
        let size = entry.size_bytes();
        if size > self.config.max_size_bytes {
            return Err(Error::EntryTooLarge {
                key: entry.key().to_string(),
                size,
                limit: self.config.max_size_bytes,
            });
        }

        let now = self.clock.now();
        let mut state = self.state.lock();
        state.remove(entry.key().as_str());

        let evicted = self.evict_locked(&mut state, size);

        let seq = state.next_seq();
        entry.last_accessed_at = now;
        entry.access_seq = seq;
        state.total_bytes += size;
        state.map.insert(entry.key().as_str().to_string(), entry);
        drop(state);

        if evicted > 0 {
            tracing::debug!(evicted, "Local store evicted entries under capacity pressure");
            self.metrics.add(CacheCounter::Eviction, evicted as u64);
        }
        Ok(())
    }

    /// Drop LRU batches until `incoming` more bytes fit
    fn evict_locked(&self, state: &mut State, incoming: u64) -> usize {
        let mut evicted = 0;
        while state.total_bytes + incoming > self.config.max_size_bytes && !state.map.is_empty() {
            let mut candidates: Vec<(DateTime<Utc>, u64, String)> = state
                .map
                .iter()
                .map(|(key, entry)| (entry.last_accessed_at, entry.access_seq, key.clone()))
                .collect();
            candidates.sort();

            let batch = ((candidates.len() as f64) * self.config.eviction_fraction).ceil() as usize;
            for (_, _, key) in candidates.into_iter().take(batch.max(1)) {
                if state.remove(&key).is_some() {
                    evicted += 1;
                }
            }
        }
        evicted
    }

    /// Remove an entry; returns whether it existed
    pub fn delete(&self, key: &CacheKey) -> bool {
        self.state.lock().remove(key.as_str()).is_some()
    }

    /// Remove every key starting with `prefix`; returns the count
    pub fn delete_by_prefix(&self, prefix: &str) -> usize {
        self.state
            .lock()
            .remove_where(|entry| entry.key().has_prefix(prefix))
    }

    /// Remove every entry with `expires_at < now`; returns the count
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let removed = self
            .state
            .lock()
            .remove_where(|entry| entry.expires_at() < now);
        self.metrics.add(CacheCounter::Expiration, removed as u64);
        removed
    }

    /// Clone of every entry still valid at `now`
    pub fn snapshot(&self, now: DateTime<Utc>) -> Vec<CacheEntry> {
        self.state
            .lock()
            .map
            .values()
            .filter(|entry| !entry.is_expired(now))
            .cloned()
            .collect()
    }

    /// Check if a key is resident (expired or not)
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.state.lock().map.contains_key(key.as_str())
    }

    /// Resident keys, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.state.lock().map.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Get number of entries
    pub fn len(&self) -> usize {
        self.state.lock().map.len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.state.lock().map.is_empty()
    }

    /// Get current size in bytes
    pub fn size_bytes(&self) -> u64 {
        self.state.lock().total_bytes
    }

    /// Get capacity
    pub fn capacity(&self) -> u64 {
        self.config.max_size_bytes
    }

    /// Get utilization (0.0 - 1.0)
    pub fn utilization(&self) -> f64 {
        self.size_bytes() as f64 / self.capacity() as f64
    }

    /// Clear the store
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.map.clear();
        state.total_bytes = 0;
    }

    /// Get store statistics
    pub fn stats(&self) -> LocalStoreStats {
        let (entries, size) = {
            let state = self.state.lock();
            (state.map.len(), state.total_bytes)
        };
        LocalStoreStats {
            entries,
            size_bytes: size,
            capacity_bytes: self.config.max_size_bytes,
            hits: self.metrics.get(CacheCounter::Hit),
            misses: self.metrics.get(CacheCounter::Miss),
            evictions: self.metrics.get(CacheCounter::Eviction),
            utilization: size as f64 / self.config.max_size_bytes as f64,
        }
    }
}

/// Local store statistics
#[derive(Debug, Clone)]
pub struct LocalStoreStats {
    pub entries: usize,
    pub size_bytes: u64,
    pub capacity_bytes: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// Utilization (0.0 - 1.0)
    pub utilization: f64,
}

// =============================================================================
// Tests
// =============================================================================
