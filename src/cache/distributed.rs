//! Distributed Store - networked cache tier
//!
//! The engine talks to the distributed tier through [`DistributedStore`],
//! which wraps a [`DistributedBackend`] and turns every failure into a miss.
//!
//! # Degradation
//!
//! - Every backend call is bounded by a timeout; a timeout counts as a
//!   connectivity failure
//! - Failures become `None` / `false` / empty, a `warn!` log and a
//!   `DistributedError` counter increment; nothing is propagated
//!
//! # Record format
//!
//! Records are stored as a JSON envelope:
//!
//! ```json
//! {"value": "<base64>", "compression": "lz4", "created_at": "..", "expires_at": "..", "stale_at": ".."}
//! ```
//!
//! Unknown fields are ignored and optional fields default, so records written
//! by older or newer writers still decode.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::clock::Clock;
use super::codec::base64_payload;
use super::compression::CompressionAlgorithm;
use super::entry::{CacheEntry, CacheKey};
use super::metrics::{CacheCounter, CacheMetrics};
use crate::error::{Error, Result};

/// Default bound on a single distributed call
pub const DEFAULT_DISTRIBUTED_TIMEOUT: Duration = Duration::from_millis(250);

/// Current envelope version
pub const RECORD_VERSION: u32 = 1;

// =============================================================================
// Backend trait
// =============================================================================

/// Raw key-value operations of a networked store
#[async_trait]
pub trait DistributedBackend: Send + Sync {
    /// Short backend name for logs and health output
    fn name(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store a value that the backend drops after `ttl`
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<bool>;

    /// Keys starting with `prefix`
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>>;

    async fn ping(&self) -> Result<()>;
}

// =============================================================================
// Record envelope
// =============================================================================

/// Wire envelope for distributed records
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributedRecord {
    #[serde(with = "base64_payload")]
    pub value: Vec<u8>,
    #[serde(default)]
    pub compression: CompressionAlgorithm,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub stale_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub version: Option<u32>,
}

impl DistributedRecord {
    pub fn from_entry(entry: &CacheEntry) -> Self {
        Self {
            value: entry.payload().to_vec(),
            compression: entry.compression(),
            created_at: entry.created_at(),
            expires_at: entry.expires_at(),
            stale_at: Some(entry.stale_at()),
            version: Some(RECORD_VERSION),
        }
    }

    /// Rebuild a cache entry, keeping the record's timestamps.
    ///
    /// A missing `stale_at` means the record never goes stale before expiry.
    pub fn into_entry(self, key: CacheKey) -> CacheEntry {
        CacheEntry::restore(
            key,
            Bytes::from(self.value),
            self.compression,
            self.created_at,
            self.stale_at.unwrap_or(self.expires_at),
            self.expires_at,
        )
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }
}

// =============================================================================
// Degrading adapter
// =============================================================================

/// Timeout-bounded, failure-absorbing front of a [`DistributedBackend`]
#[derive(Clone)]
pub struct DistributedStore {
    backend: Arc<dyn DistributedBackend>,
    timeout: Duration,
    clock: Arc<dyn Clock>,
    metrics: Arc<CacheMetrics>,
}

impl DistributedStore {
    pub fn new(
        backend: Arc<dyn DistributedBackend>,
        timeout: Duration,
        clock: Arc<dyn Clock>,
        metrics: Arc<CacheMetrics>,
    ) -> Self {
        Self {
            backend,
            timeout,
            clock,
            metrics,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run a backend call under the timeout, absorbing failures
    async fn guarded<T, F>(&self, op: &'static str, key: &str, fut: F) -> Option<T>
    where
        F: Future<Output = Result<T>>,
    {
        let result = match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::DistributedUnavailable(format!(
                "{} timed out after {:?}",
                op, self.timeout
            ))),
        };

        match result {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(
                    backend = self.backend.name(),
                    op,
                    key,
                    error = %e,
                    "Distributed tier call failed, degrading"
                );
                self.metrics.record(CacheCounter::DistributedError);
                None
            }
        }
    }

    /// Fetch a non-expired entry
    pub async fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        let raw = self
            .guarded("get", key.as_str(), self.backend.get(key.as_str()))
            .await
            .flatten()?;

        let record = match DistributedRecord::from_bytes(&raw) {
            Ok(record) => record,
            Err(e) => {
                warn!(key = %key, error = %e, "Undecodable distributed record");
                self.metrics.record(CacheCounter::SerializationError);
                return None;
            }
        };

        if self.clock.now() > record.expires_at {
            debug!(key = %key, "Distributed record already expired");
            return None;
        }

        Some(record.into_entry(key.clone()))
    }

    /// Write an entry; its remaining lifetime becomes the backend TTL
    pub async fn set(&self, entry: &CacheEntry) -> bool {
        let remaining = entry.expires_at() - self.clock.now();
        let ttl = match remaining.to_std() {
            Ok(ttl) if !ttl.is_zero() => ttl,
            _ => return false,
        };

        let bytes = match DistributedRecord::from_entry(entry).to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key = %entry.key(), error = %e, "Failed to encode distributed record");
                self.metrics.record(CacheCounter::SerializationError);
                return false;
            }
        };

        let key = entry.key().as_str();
        self.guarded("set", key, self.backend.set(key, bytes, ttl))
            .await
            .is_some()
    }

    pub async fn delete(&self, key: &str) -> bool {
        self.guarded("delete", key, self.backend.delete(key))
            .await
            .unwrap_or(false)
    }

    pub async fn scan_by_prefix(&self, prefix: &str) -> Vec<String> {
        self.guarded("scan", prefix, self.backend.scan_prefix(prefix))
            .await
            .unwrap_or_default()
    }

    /// Delete every key under `prefix`; returns how many deletes succeeded
    pub async fn delete_by_prefix(&self, prefix: &str) -> usize {
        let mut removed = 0;
        for key in self.scan_by_prefix(prefix).await {
            if self.delete(&key).await {
                removed += 1;
            }
        }
        removed
    }

    /// Whether the backend answers within the timeout
    pub async fn ping(&self) -> bool {
        self.guarded("ping", "", self.backend.ping()).await.is_some()
    }
}

// =============================================================================
// In-memory backend
// =============================================================================

/// Process-local backend for tests and single-node deployments
#[derive(Default)]
pub struct InMemoryDistributedBackend {
    data: DashMap<String, (Vec<u8>, Instant)>,
}

impl InMemoryDistributedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.data
            .get(key)
            .map(|slot| slot.1 > Instant::now())
            .unwrap_or(false)
    }

    /// Store raw bytes without TTL checks, for seeding tests
    pub fn insert_raw(&self, key: &str, value: Vec<u8>) {
        self.data.insert(
            key.to_string(),
            (value, Instant::now() + Duration::from_secs(86_400)),
        );
    }
}

/// Expiry instant for `ttl`, capped where `Instant` arithmetic would overflow
fn deadline_after(ttl: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(ttl)
        .unwrap_or_else(|| now + Duration::from_secs(100 * 365 * 86_400))
}

#[async_trait]
impl DistributedBackend for InMemoryDistributedBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let now = Instant::now();
        let hit = self.data.get(key).and_then(|slot| {
            if slot.1 > now {
                Some(slot.0.clone())
            } else {
                None
            }
        });
        if hit.is_none() {
            self.data.remove_if(key, |_, slot| slot.1 <= now);
        }
        Ok(hit)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        self.data.insert(key.to_string(), (value, deadline_after(ttl)));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.data.remove(key).is_some())
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let now = Instant::now();
        Ok(self
            .data
            .iter()
            .filter(|item| item.key().starts_with(prefix) && item.value().1 > now)
            .map(|item| item.key().clone())
            .collect())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

// =============================================================================
// Failing backend
// =============================================================================

/// How a [`FailingBackend`] misbehaves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    /// Every call returns an error immediately
    Error,
    /// Every call hangs until the caller's timeout fires
    Hang,
}

/// Backend that never works, for exercising degradation
#[derive(Debug, Clone, Copy)]
pub struct FailingBackend {
    mode: FailureMode,
}

impl FailingBackend {
    pub fn erroring() -> Self {
        Self {
            mode: FailureMode::Error,
        }
    }

    pub fn hanging() -> Self {
        Self {
            mode: FailureMode::Hang,
        }
    }

    async fn fail<T>(&self) -> Result<T> {
        match self.mode {
            FailureMode::Error => Err(Error::DistributedUnavailable(
                "connection refused".to_string(),
            )),
            FailureMode::Hang => std::future::pending().await,
        }
    }
}

#[async_trait]
impl DistributedBackend for FailingBackend {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
        self.fail().await
    }

    async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> Result<()> {
        self.fail().await
    }

    async fn delete(&self, _key: &str) -> Result<bool> {
        self.fail().await
    }

    async fn scan_prefix(&self, _prefix: &str) -> Result<Vec<String>> {
        self.fail().await
    }

    async fn ping(&self) -> Result<()> {
        self.fail().await
    }
}

// =============================================================================
// Tests
// =============================================================================
