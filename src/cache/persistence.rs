//! Persistence Adapter - snapshot and restore of the local store
//!
//! The whole local store is written as one JSON document per engine
//! instance:
//!
//! ```json
//! {"version": 1, "saved_at": "..", "entries": {"orders:detail:O1": {"value": "<base64>", "compression": "none",
//!   "created_at": "..", "expires_at": "..", "stale_at": ".."}}}
//! ```
//!
//! Restore is forgiving: unreadable or corrupt storage restores nothing, a
//! single undecodable entry is skipped, and entries that are expired or older
//! than the restore ceiling are dropped.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::clock::Clock;
use super::codec::base64_payload;
use super::compression::CompressionAlgorithm;
use super::entry::{CacheEntry, CacheKey};
use super::local::LocalStore;
use super::metrics::{CacheCounter, CacheMetrics};
use crate::error::{Error, Result};

/// Snapshot document version
pub const SNAPSHOT_VERSION: u32 = 1;

/// File name suffix for file snapshots
pub const SNAPSHOT_SUFFIX: &str = "tiercache.json";

/// Default age ceiling for restored entries
pub const DEFAULT_MAX_RESTORE_AGE: Duration = Duration::from_secs(24 * 60 * 60);

// =============================================================================
// Storage
// =============================================================================

/// Durable storage for one snapshot document
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Human-readable location for logs
    fn describe(&self) -> String;

    /// Replace the stored document
    async fn write(&self, data: Vec<u8>) -> Result<()>;

    /// Read the stored document, `None` if nothing was ever written
    async fn read(&self) -> Result<Option<Vec<u8>>>;
}

/// Snapshot kept in a file, replaced atomically via temp file + rename
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    /// Snapshot at `<dir>/<instance>.tiercache.json`
    pub fn new(dir: impl AsRef<Path>, instance: &str) -> Self {
        Self {
            path: dir
                .as_ref()
                .join(format!("{}.{}", instance, SNAPSHOT_SUFFIX)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    async fn write(&self, data: Vec<u8>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &data).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    async fn read(&self) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(&self.path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Snapshot kept in memory, for tests and ephemeral deployments
#[derive(Default)]
pub struct InMemorySnapshotStore {
    data: Mutex<Option<Vec<u8>>>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the stored bytes directly
    pub fn set_raw(&self, data: Vec<u8>) {
        *self.data.lock() = Some(data);
    }

    pub fn raw(&self) -> Option<Vec<u8>> {
        self.data.lock().clone()
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    fn describe(&self) -> String {
        "memory".to_string()
    }

    async fn write(&self, data: Vec<u8>) -> Result<()> {
        self.set_raw(data);
        Ok(())
    }

    async fn read(&self) -> Result<Option<Vec<u8>>> {
        Ok(self.raw())
    }
}

// =============================================================================
// Document format
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotDocument {
    version: u32,
    saved_at: DateTime<Utc>,
    entries: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedEntry {
    #[serde(with = "base64_payload")]
    value: Vec<u8>,
    #[serde(default)]
    compression: CompressionAlgorithm,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    #[serde(default)]
    stale_at: Option<DateTime<Utc>>,
}

impl PersistedEntry {
    fn from_entry(entry: &CacheEntry) -> Self {
        Self {
            value: entry.payload().to_vec(),
            compression: entry.compression(),
            created_at: entry.created_at(),
            expires_at: entry.expires_at(),
            stale_at: Some(entry.stale_at()),
        }
    }

    fn into_entry(self, key: CacheKey) -> CacheEntry {
        CacheEntry::restore(
            key,
            Bytes::from(self.value),
            self.compression,
            self.created_at,
            self.stale_at.unwrap_or(self.expires_at),
            self.expires_at,
        )
    }
}

// =============================================================================
// Adapter
// =============================================================================

/// Saves and restores the local store through a [`SnapshotStore`]
pub struct PersistenceAdapter {
    store: Arc<dyn SnapshotStore>,
    clock: Arc<dyn Clock>,
    metrics: Arc<CacheMetrics>,
    max_restore_age: chrono::Duration,
    last_saved_at: Mutex<Option<DateTime<Utc>>>,
    last_error: Mutex<Option<String>>,
}

impl PersistenceAdapter {
    pub fn new(
        store: Arc<dyn SnapshotStore>,
        clock: Arc<dyn Clock>,
        metrics: Arc<CacheMetrics>,
        max_restore_age: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            metrics,
            max_restore_age: chrono::Duration::from_std(max_restore_age)
                .unwrap_or_else(|_| chrono::Duration::days(1)),
            last_saved_at: Mutex::new(None),
            last_error: Mutex::new(None),
        }
    }

    pub fn describe(&self) -> String {
        self.store.describe()
    }

    /// Write every non-expired resident entry; returns the entry count
    pub async fn save(&self, local: &LocalStore) -> Result<usize> {
        let now = self.clock.now();
        let mut entries = BTreeMap::new();
        for entry in local.snapshot(now) {
            let value = serde_json::to_value(PersistedEntry::from_entry(&entry))?;
            entries.insert(entry.key().as_str().to_string(), value);
        }
        let count = entries.len();

        let doc = SnapshotDocument {
            version: SNAPSHOT_VERSION,
            saved_at: now,
            entries,
        };
        let data = serde_json::to_vec(&doc)?;

        match self.store.write(data).await {
            Ok(()) => {
                *self.last_saved_at.lock() = Some(now);
                *self.last_error.lock() = None;
                self.metrics.record(CacheCounter::PersistenceSave);
                debug!(entries = count, location = %self.store.describe(), "Snapshot saved");
                Ok(count)
            }
            Err(e) => {
                *self.last_error.lock() = Some(e.to_string());
                self.metrics.record(CacheCounter::PersistenceError);
                warn!(error = %e, location = %self.store.describe(), "Snapshot save failed");
                Err(e)
            }
        }
    }

    /// Read the snapshot and return the entries worth restoring
    pub async fn load(&self) -> Vec<CacheEntry> {
        let data = match self.store.read().await {
            Ok(Some(data)) => data,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(error = %e, location = %self.store.describe(), "Snapshot unreadable, starting empty");
                self.metrics.record(CacheCounter::PersistenceError);
                return Vec::new();
            }
        };

        let doc: SnapshotDocument = match serde_json::from_slice(&data) {
            Ok(doc) => doc,
            Err(e) => {
                let err = Error::PersistenceCorrupt(e.to_string());
                warn!(error = %err, location = %self.store.describe(), "Starting empty");
                self.metrics.record(CacheCounter::PersistenceError);
                return Vec::new();
            }
        };

        let now = self.clock.now();
        let oldest = now - self.max_restore_age;
        let mut restored = Vec::with_capacity(doc.entries.len());

        for (raw_key, value) in doc.entries {
            let Some(key) = CacheKey::parse(&raw_key) else {
                warn!(key = %raw_key, "Skipping snapshot entry with unknown namespace");
                self.metrics.record(CacheCounter::SerializationError);
                continue;
            };
            let persisted: PersistedEntry = match serde_json::from_value(value) {
                Ok(persisted) => persisted,
                Err(e) => {
                    warn!(key = %raw_key, error = %e, "Skipping undecodable snapshot entry");
                    self.metrics.record(CacheCounter::SerializationError);
                    continue;
                }
            };

            let entry = persisted.into_entry(key);
            if entry.is_expired(now) || entry.created_at() < oldest {
                continue;
            }
            restored.push(entry);
        }

        restored
    }

    /// Load the snapshot into `local`; returns the number of entries inserted
    pub async fn restore_into(&self, local: &LocalStore) -> usize {
        let mut inserted = 0;
        for entry in self.load().await {
            let key = entry.key().clone();
            match local.insert(entry) {
                Ok(()) => inserted += 1,
                Err(e) => warn!(key = %key, error = %e, "Skipping snapshot entry on restore"),
            }
        }
        info!(entries = inserted, location = %self.store.describe(), "Local store restored");
        inserted
    }

    pub fn last_saved_at(&self) -> Option<DateTime<Utc>> {
        *self.last_saved_at.lock()
    }

    /// Error of the most recent save, cleared by the next success
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }
}

// =============================================================================
// Persister task
// =============================================================================

/// Spawn the task that coalesces save requests.
///
/// Each `notify` wakes the task, which waits `debounce` so a burst of
/// mutations becomes one write. On cancellation it flushes once more.
pub fn spawn_persister(
    adapter: Arc<PersistenceAdapter>,
    local: Arc<LocalStore>,
    notify: Arc<Notify>,
    debounce: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(debounce_ms = debounce.as_millis() as u64, "Persister started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = notify.notified() => {}
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(debounce) => {}
            }
            // Failures are already logged and counted
            let _ = adapter.save(&local).await;
        }

        if let Err(e) = adapter.save(&local).await {
            warn!(error = %e, "Final snapshot flush failed");
        }
        info!("Persister stopped");
    })
}

// =============================================================================
// Tests
// =============================================================================
