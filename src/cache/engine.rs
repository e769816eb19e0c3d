//! Cache Engine - read-through coordinator over the cache tiers
//!
//! Reads go Local -> Distributed -> Origin and populate on the way back.
//! Stale-but-valid local entries are served immediately while one background
//! refresh per key re-fetches from the origin.
//!
//! # Example
//!
//! ```ignore
//! let engine = CacheEngine::builder(config)
//!     .with_distributed_backend(Arc::new(InMemoryDistributedBackend::new()))
//!     .build()?;
//! engine.init().await?;
//!
//! let order: Order = engine
//!     .get(Namespace::Orders, "detail:O1", |key| async move { db.load_order(&key).await })
//!     .await?;
//!
//! engine.on_entity_mutated(&MutationEvent::order(MutationKind::Update, "O1", "R1"));
//! engine.shutdown().await;
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashSet;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::clock::{Clock, SystemClock};
use super::codec::ValueCodec;
use super::distributed::{DistributedBackend, DistributedStore};
use super::entry::{CacheEntry, CacheKey, Freshness, Namespace};
use super::gc::{GarbageCollector, GcReport};
use super::invalidation::{
    apply_local, spawn_distributed_cleanup, InvalidationLedger, InvalidationReport,
    InvalidationRouter, InvalidationRule, LedgerWatch, MutationEvent,
};
use super::local::{LocalStore, LocalStoreConfig};
use super::metrics::{CacheCounter, CacheMetrics, MetricsSink};
use super::persistence::{spawn_persister, FileSnapshotStore, PersistenceAdapter, SnapshotStore};
use super::policy::{CachePolicy, PolicyRegistry};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::monitoring::health::{
    check_distributed, check_local_store, check_persistence, HealthCheck, HealthCheckResult,
    HealthResponse,
};

/// Where a read was answered from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadSource {
    Local,
    Distributed,
    Origin,
}

impl std::fmt::Display for ReadSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReadSource::Local => write!(f, "local"),
            ReadSource::Distributed => write!(f, "distributed"),
            ReadSource::Origin => write!(f, "origin"),
        }
    }
}

/// Value plus how it was obtained
#[derive(Debug, Clone)]
pub struct CacheRead<T> {
    pub value: T,
    pub source: ReadSource,
    /// Freshness of the cached copy; origin reads are always fresh
    pub freshness: Freshness,
}

/// Supplies the well-known ids of a namespace for warming
#[async_trait]
pub trait Warmer: Send + Sync {
    /// Ids (without namespace) to pre-populate
    fn keys(&self) -> Vec<String>;

    async fn fetch(&self, id: &str) -> anyhow::Result<serde_json::Value>;
}

/// Outcome of [`CacheEngine::warm`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WarmReport {
    pub attempted: usize,
    pub loaded: usize,
    /// Already resident, left alone
    pub skipped: usize,
    pub failed: usize,
}

/// Point-in-time engine statistics
#[derive(Debug, Clone, Serialize)]
pub struct Statistics {
    pub entry_count: usize,
    pub total_size_bytes: u64,
    pub capacity_bytes: u64,
    pub hit_count: u64,
    pub miss_count: u64,
    pub stale_hit_count: u64,
    pub distributed_hits: u64,
    pub distributed_errors: u64,
    pub origin_fetches: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub invalidations: u64,
    pub gc_runs: u64,
    pub last_gc_at: Option<DateTime<Utc>>,
    pub last_gc_removed: Option<usize>,
    pub refreshes_in_flight: usize,
    pub hit_ratio: f64,
}

// =============================================================================
// Builder
// =============================================================================

/// Assembles a [`CacheEngine`] from config and collaborators
pub struct CacheEngineBuilder {
    config: EngineConfig,
    clock: Option<Arc<dyn Clock>>,
    backend: Option<Arc<dyn DistributedBackend>>,
    snapshot_store: Option<Arc<dyn SnapshotStore>>,
    sinks: Vec<Arc<dyn MetricsSink>>,
    rules: Vec<InvalidationRule>,
    default_rules: bool,
    warmers: Vec<(Namespace, Arc<dyn Warmer>)>,
}

impl CacheEngineBuilder {
    fn new(config: EngineConfig) -> Self {
        Self {
            config,
            clock: None,
            backend: None,
            snapshot_store: None,
            sinks: Vec::new(),
            rules: Vec::new(),
            default_rules: true,
            warmers: Vec::new(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_distributed_backend(mut self, backend: Arc<dyn DistributedBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Overrides the file store derived from `persistence_dir`
    pub fn with_snapshot_store(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.snapshot_store = Some(store);
        self
    }

    pub fn with_metrics_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn with_invalidation_rule(mut self, rule: InvalidationRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Start from an empty rule table
    pub fn without_default_rules(mut self) -> Self {
        self.default_rules = false;
        self
    }

    pub fn with_warmer(mut self, namespace: Namespace, warmer: Arc<dyn Warmer>) -> Self {
        self.warmers.push((namespace, warmer));
        self
    }

    pub fn build(self) -> Result<CacheEngine> {
        self.config.validate()?;
        let config = self.config;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let metrics = Arc::new(CacheMetrics::with_sinks(self.sinks));

        let policies = PolicyRegistry::with_defaults(config.default_policy.clone());
        for (class, policy) in &config.policies {
            policies.register(class.clone(), policy.clone());
        }

        let local = Arc::new(LocalStore::new(
            LocalStoreConfig {
                max_size_bytes: config.max_cache_size_bytes,
                ..Default::default()
            },
            clock.clone(),
            metrics.clone(),
        ));

        let distributed = self.backend.map(|backend| {
            DistributedStore::new(
                backend,
                config.distributed_timeout(),
                clock.clone(),
                metrics.clone(),
            )
        });

        let snapshot_store = self.snapshot_store.or_else(|| {
            config.persistence_dir.as_ref().map(|dir| {
                Arc::new(FileSnapshotStore::new(dir, &config.instance_name)) as Arc<dyn SnapshotStore>
            })
        });
        let persistence = snapshot_store.map(|store| {
            Arc::new(PersistenceAdapter::new(
                store,
                clock.clone(),
                metrics.clone(),
                config.max_restore_age(),
            ))
        });

        let router = if self.default_rules {
            InvalidationRouter::with_default_rules()
        } else {
            InvalidationRouter::new()
        };
        for rule in self.rules {
            router.register_rule(rule);
        }

        let gc = Arc::new(
            GarbageCollector::new(local.clone(), clock.clone(), metrics.clone())
                .with_interval(config.gc_interval()),
        );

        let mut warmers: HashMap<Namespace, Vec<Arc<dyn Warmer>>> = HashMap::new();
        for (namespace, warmer) in self.warmers {
            warmers.entry(namespace).or_default().push(warmer);
        }

        let codec = ValueCodec::new(config.compression.clone());

        Ok(CacheEngine {
            inner: Arc::new(EngineInner {
                config,
                clock,
                policies,
                local,
                distributed,
                persistence,
                router,
                ledger: Arc::new(InvalidationLedger::new()),
                gc,
                codec,
                metrics,
                warmers,
                in_flight: DashSet::new(),
                persist_notify: Arc::new(Notify::new()),
                shutdown: CancellationToken::new(),
                tasks: Mutex::new(Vec::new()),
                initialized: AtomicBool::new(false),
                health: HealthCheck::new(),
            }),
        })
    }
}

// =============================================================================
// Engine
// =============================================================================

struct EngineInner {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    policies: PolicyRegistry,
    local: Arc<LocalStore>,
    distributed: Option<DistributedStore>,
    persistence: Option<Arc<PersistenceAdapter>>,
    router: InvalidationRouter,
    ledger: Arc<InvalidationLedger>,
    gc: Arc<GarbageCollector>,
    codec: ValueCodec,
    metrics: Arc<CacheMetrics>,
    warmers: HashMap<Namespace, Vec<Arc<dyn Warmer>>>,
    /// Keys with a background refresh running
    in_flight: DashSet<String>,
    persist_notify: Arc<Notify>,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    initialized: AtomicBool,
    health: HealthCheck,
}

/// Clears a key's in-flight marker however the refresh ends
struct InFlightGuard {
    inner: Arc<EngineInner>,
    key: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.inner.in_flight.remove(&self.key);
    }
}

/// Multi-tier cache engine; clones share one engine
#[derive(Clone)]
pub struct CacheEngine {
    inner: Arc<EngineInner>,
}

impl CacheEngine {
    pub fn builder(config: EngineConfig) -> CacheEngineBuilder {
        CacheEngineBuilder::new(config)
    }

    /// Restore the snapshot and start the collector and persister.
    ///
    /// Calling it again is a no-op.
    pub async fn init(&self) -> Result<()> {
        if self.inner.initialized.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let inner = &self.inner;

        if let Some(persistence) = &inner.persistence {
            persistence.restore_into(&inner.local).await;
        }

        let mut tasks = Vec::new();
        tasks.push(tokio::spawn(inner.gc.clone().run(inner.shutdown.child_token())));
        if let Some(persistence) = &inner.persistence {
            tasks.push(spawn_persister(
                persistence.clone(),
                inner.local.clone(),
                inner.persist_notify.clone(),
                inner.config.persist_debounce(),
                inner.shutdown.child_token(),
            ));
        }
        inner.tasks.lock().extend(tasks);
        inner.health.set_ready(true);

        info!(
            instance = %inner.config.instance_name,
            entries = inner.local.len(),
            distributed = inner.distributed.as_ref().map(|d| d.backend_name()).unwrap_or("none"),
            persistence = inner.persistence.as_ref().map(|p| p.describe()).unwrap_or_else(|| "none".into()),
            "Cache engine initialized"
        );
        Ok(())
    }

    /// Cancel background work and wait for it, including the final snapshot flush
    pub async fn shutdown(&self) {
        let inner = &self.inner;
        inner.health.set_ready(false);
        inner.shutdown.cancel();

        let tasks: Vec<JoinHandle<()>> = inner.tasks.lock().drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Background task ended abnormally");
            }
        }
        info!(instance = %inner.config.instance_name, "Cache engine shut down");
    }

    // =========================================================================
    // Read path
    // =========================================================================

    /// Read through the tiers, fetching from the origin on a full miss.
    ///
    /// `fetch` receives the full cache key. Only origin failures
    /// ([`Error::OriginFetchFailed`]) are returned; cache-side failures fall
    /// back to the next tier.
    pub async fn get<T, F, Fut>(&self, namespace: Namespace, id: &str, fetch: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        Ok(self.get_traced(namespace, id, fetch).await?.value)
    }

    /// [`get`](Self::get), also reporting which tier answered
    pub async fn get_traced<T, F, Fut>(
        &self,
        namespace: Namespace,
        id: &str,
        fetch: F,
    ) -> Result<CacheRead<T>>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let key = CacheKey::new(namespace, id);
        let policy = self.inner.policies.resolve_for_key(&key);
        let fetch = Arc::new(fetch);

        if let Some(entry) = self.inner.local.get(&key) {
            let freshness = entry.freshness(self.inner.clock.now());
            let decoded = match freshness {
                Freshness::Expired => None,
                _ => self.decode_or_drop::<T>(&entry),
            };
            if let Some(value) = decoded {
                if freshness == Freshness::Stale {
                    self.inner.metrics.record(CacheCounter::StaleHit);
                    if policy.background_refresh {
                        self.spawn_refresh::<T, F, Fut>(key.clone(), policy.clone(), fetch.clone());
                    }
                }
                debug!(key = %key, ?freshness, "Local hit");
                return Ok(CacheRead {
                    value,
                    source: ReadSource::Local,
                    freshness,
                });
            }
        }

        let watch = self.inner.ledger.watch();
        if let Some(read) = self.read_distributed::<T>(&key, &watch).await {
            if read.freshness == Freshness::Stale && policy.background_refresh {
                self.spawn_refresh::<T, F, Fut>(key.clone(), policy.clone(), fetch.clone());
            }
            return Ok(read);
        }

        let value = self.fetch_origin::<T, F, Fut>(&key, fetch.as_ref()).await?;
        if watch.invalidated(&key) {
            debug!(key = %key, "Invalidated during origin fetch, not cached");
        } else if let Some(entry) = self.encode_entry(&key, &value, &policy) {
            if let Err(e) = self.store_entry(entry, &policy).await {
                warn!(key = %key, error = %e, "Fetched value not cached");
            }
        }

        Ok(CacheRead {
            value,
            source: ReadSource::Origin,
            freshness: Freshness::Fresh,
        })
    }

    /// Cache-only lookup; never calls the origin or schedules refreshes
    pub async fn get_cached<T>(&self, namespace: Namespace, id: &str) -> Option<T>
    where
        T: DeserializeOwned,
    {
        let key = CacheKey::new(namespace, id);
        if let Some(entry) = self.inner.local.get(&key) {
            if let Some(value) = self.decode_or_drop(&entry) {
                return Some(value);
            }
        }
        let watch = self.inner.ledger.watch();
        self.read_distributed::<T>(&key, &watch)
            .await
            .map(|read| read.value)
    }

    /// Distributed lookup with promotion into the local tier.
    ///
    /// Skipped while an invalidation of `key` is still being cleaned out of
    /// the distributed tier; a record read across an invalidation is dropped.
    async fn read_distributed<T: DeserializeOwned>(
        &self,
        key: &CacheKey,
        watch: &LedgerWatch,
    ) -> Option<CacheRead<T>> {
        let distributed = self.inner.distributed.as_ref()?;
        if self.inner.ledger.is_pending(key) {
            debug!(key = %key, "Distributed invalidation pending, skipping tier");
            return None;
        }
        let entry = distributed.get(key).await?;
        if watch.invalidated(key) {
            debug!(key = %key, "Invalidated during distributed read");
            return None;
        }
        let freshness = entry.freshness(self.inner.clock.now());

        let value = match self.decode(&entry) {
            Ok(value) => value,
            Err(e) => {
                warn!(key = %key, error = %e, "Undecodable distributed value");
                self.inner.metrics.record(CacheCounter::SerializationError);
                return None;
            }
        };

        self.inner.metrics.record(CacheCounter::DistributedHit);
        match self.inner.local.insert(entry) {
            Ok(()) => self.request_persist(),
            Err(e) => warn!(key = %key, error = %e, "Distributed hit not promoted"),
        }
        debug!(key = %key, ?freshness, "Distributed hit");

        Some(CacheRead {
            value,
            source: ReadSource::Distributed,
            freshness,
        })
    }

    async fn fetch_origin<T, F, Fut>(&self, key: &CacheKey, fetch: &F) -> Result<T>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        self.inner.metrics.record(CacheCounter::OriginFetch);
        let started = Instant::now();
        match fetch(key.as_str().to_string()).await {
            Ok(value) => {
                debug!(key = %key, elapsed_ms = started.elapsed().as_millis() as u64, "Origin fetch");
                Ok(value)
            }
            Err(source) => {
                self.inner.metrics.record(CacheCounter::OriginError);
                Err(Error::OriginFetchFailed {
                    key: key.as_str().to_string(),
                    source,
                })
            }
        }
    }

    /// Schedule one background refresh for `key` unless one is running
    fn spawn_refresh<T, F, Fut>(&self, key: CacheKey, policy: CachePolicy, fetch: Arc<F>)
    where
        T: Serialize + Send + Sync + 'static,
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!(key = %key, "No async runtime, refresh skipped");
            return;
        };
        if !self.inner.in_flight.insert(key.as_str().to_string()) {
            debug!(key = %key, "Refresh already in flight");
            return;
        }
        let guard = InFlightGuard {
            inner: self.inner.clone(),
            key: key.as_str().to_string(),
        };
        self.inner.metrics.record(CacheCounter::RefreshStarted);

        let watch = self.inner.ledger.watch();
        let engine = self.clone();
        let shutdown = self.inner.shutdown.clone();
        handle.spawn(async move {
            let _guard = guard;
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!(key = %key, "Refresh cancelled by shutdown");
                }
                result = engine.refresh::<T, F, Fut>(&key, &policy, fetch.as_ref(), &watch) => {
                    if let Err(e) = result {
                        engine.inner.metrics.record(CacheCounter::RefreshFailed);
                        warn!(key = %key, error = %e, "Background refresh failed, keeping stale entry");
                    }
                }
            }
        });
    }

    /// Re-fetch and repopulate; dropped if `key` was invalidated meanwhile
    async fn refresh<T, F, Fut>(
        &self,
        key: &CacheKey,
        policy: &CachePolicy,
        fetch: &F,
        watch: &LedgerWatch,
    ) -> Result<()>
    where
        T: Serialize,
        F: Fn(String) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let entry = {
            let value = self.fetch_origin::<T, F, Fut>(key, fetch).await?;
            if watch.invalidated(key) {
                debug!(key = %key, "Invalidated during refresh, result discarded");
                return Ok(());
            }
            self.encode_entry(key, &value, policy)
        };
        if let Some(entry) = entry {
            self.store_entry(entry, policy).await?;
            debug!(key = %key, "Refreshed");
        }
        Ok(())
    }

    // =========================================================================
    // Write path
    // =========================================================================

    /// Write-through a value to both tiers.
    ///
    /// Fails only with [`Error::EntryTooLarge`].
    pub async fn set<T: Serialize>(&self, namespace: Namespace, id: &str, value: &T) -> Result<()> {
        let key = CacheKey::new(namespace, id);
        let policy = self.inner.policies.resolve_for_key(&key);
        match self.encode_entry(&key, value, &policy) {
            Some(entry) => self.store_entry(entry, &policy).await,
            None => Ok(()),
        }
    }

    /// Drop one key from both tiers
    pub async fn remove(&self, namespace: Namespace, id: &str) -> bool {
        let key = CacheKey::new(namespace, id);
        let removed = self.inner.local.delete(&key);
        if let Some(distributed) = &self.inner.distributed {
            distributed.delete(key.as_str()).await;
        }
        if removed {
            self.request_persist();
        }
        removed
    }

    /// Serialize a value into an entry; failures are logged and counted
    fn encode_entry<T: Serialize>(&self, key: &CacheKey, value: &T, policy: &CachePolicy) -> Option<CacheEntry> {
        match self.inner.codec.encode(value, policy) {
            Ok((payload, compression)) => Some(CacheEntry::new(
                key.clone(),
                payload,
                compression,
                policy,
                self.inner.clock.now(),
            )),
            Err(e) => {
                warn!(key = %key, error = %e, "Value not serializable, not cached");
                self.inner.metrics.record(CacheCounter::SerializationError);
                None
            }
        }
    }

    /// Populate local (synchronously) and distributed, then request a snapshot
    async fn store_entry(&self, entry: CacheEntry, policy: &CachePolicy) -> Result<()> {
        self.inner.local.put(entry.clone(), policy)?;
        if let Some(distributed) = &self.inner.distributed {
            distributed.set(&entry).await;
        }
        self.request_persist();
        Ok(())
    }

    fn decode<T: DeserializeOwned>(&self, entry: &CacheEntry) -> Result<T> {
        self.inner.codec.decode(entry.payload(), entry.compression())
    }

    /// Decode a local entry; an undecodable one is removed and treated as a miss
    fn decode_or_drop<T: DeserializeOwned>(&self, entry: &CacheEntry) -> Option<T> {
        match self.decode(entry) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key = %entry.key(), error = %e, "Undecodable local entry dropped");
                self.inner.metrics.record(CacheCounter::SerializationError);
                self.inner.local.delete(entry.key());
                None
            }
        }
    }

    fn request_persist(&self) {
        if self.inner.persistence.is_some() {
            self.inner.persist_notify.notify_one();
        }
    }

    // =========================================================================
    // Invalidation
    // =========================================================================

    /// Apply a mutation's invalidation cascade.
    ///
    /// Local deletes are complete on return; distributed deletes run in the
    /// background.
    pub fn invalidate(&self, event: &MutationEvent) -> InvalidationReport {
        let inner = &self.inner;
        inner.metrics.record(CacheCounter::Invalidation);
        let targets = inner.router.derive(event);
        if targets.is_empty() {
            return InvalidationReport::default();
        }

        let seq = inner
            .ledger
            .record(targets.clone(), inner.distributed.is_some());
        let report = apply_local(&targets, &inner.local);

        if let Some(distributed) = &inner.distributed {
            let ledger = inner.ledger.clone();
            if !spawn_distributed_cleanup(distributed.clone(), targets, move || ledger.settle(seq)) {
                inner.ledger.settle(seq);
            }
        }

        debug!(
            entity = %event.entity_kind(),
            keys = report.keys.len(),
            prefixes = report.prefixes.len(),
            local_removed = report.local_removed,
            "Invalidated"
        );
        if report.local_removed > 0 {
            self.request_persist();
        }
        report
    }

    /// Call site for application write paths after every successful mutation
    pub fn on_entity_mutated(&self, event: &MutationEvent) -> InvalidationReport {
        self.invalidate(event)
    }

    pub fn register_invalidation_rule(&self, rule: InvalidationRule) {
        self.inner.router.register_rule(rule);
    }

    // =========================================================================
    // Warming
    // =========================================================================

    /// Pre-populate the well-known keys of a namespace.
    ///
    /// Best effort: failures are logged and counted in the report.
    pub async fn warm(&self, namespace: Namespace) -> WarmReport {
        let mut report = WarmReport::default();
        let Some(warmers) = self.inner.warmers.get(&namespace) else {
            debug!(%namespace, "No warmer registered");
            return report;
        };

        for warmer in warmers {
            for id in warmer.keys() {
                report.attempted += 1;
                let key = CacheKey::new(namespace, &id);
                if self.inner.local.peek(&key).is_some() {
                    report.skipped += 1;
                    continue;
                }

                let value = match warmer.fetch(&id).await {
                    Ok(value) => value,
                    Err(e) => {
                        warn!(key = %key, error = %e, "Warm fetch failed");
                        report.failed += 1;
                        continue;
                    }
                };

                let policy = self.inner.policies.resolve_for_key(&key);
                let stored = match self.encode_entry(&key, &value, &policy) {
                    Some(entry) => self.store_entry(entry, &policy).await,
                    None => Err(Error::Internal("value not serializable".into())),
                };
                match stored {
                    Ok(()) => report.loaded += 1,
                    Err(e) => {
                        warn!(key = %key, error = %e, "Warm value not cached");
                        report.failed += 1;
                    }
                }
            }
        }

        info!(
            %namespace,
            attempted = report.attempted,
            loaded = report.loaded,
            skipped = report.skipped,
            failed = report.failed,
            "Namespace warmed"
        );
        report
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    pub fn statistics(&self) -> Statistics {
        let inner = &self.inner;
        let metrics = &inner.metrics;
        let last_gc = inner.gc.last_report();
        Statistics {
            entry_count: inner.local.len(),
            total_size_bytes: inner.local.size_bytes(),
            capacity_bytes: inner.local.capacity(),
            hit_count: metrics.get(CacheCounter::Hit),
            miss_count: metrics.get(CacheCounter::Miss),
            stale_hit_count: metrics.get(CacheCounter::StaleHit),
            distributed_hits: metrics.get(CacheCounter::DistributedHit),
            distributed_errors: metrics.get(CacheCounter::DistributedError),
            origin_fetches: metrics.get(CacheCounter::OriginFetch),
            evictions: metrics.get(CacheCounter::Eviction),
            expirations: metrics.get(CacheCounter::Expiration),
            invalidations: metrics.get(CacheCounter::Invalidation),
            gc_runs: metrics.get(CacheCounter::GcRun),
            last_gc_at: last_gc.map(|r| r.run_timestamp),
            last_gc_removed: last_gc.map(|r| r.removed_count),
            refreshes_in_flight: inner.in_flight.len(),
            hit_ratio: metrics.hit_ratio(),
        }
    }

    /// Component health; pings the distributed tier
    pub async fn health(&self) -> HealthResponse {
        let inner = &self.inner;
        let mut checks: Vec<HealthCheckResult> = vec![
            inner.health.readiness_check(),
            check_local_store(inner.local.utilization(), inner.local.len()),
        ];

        if let Some(distributed) = &inner.distributed {
            let started = Instant::now();
            let reachable = distributed.ping().await;
            checks.push(check_distributed(
                distributed.backend_name(),
                reachable,
                started.elapsed(),
            ));
        }
        if let Some(persistence) = &inner.persistence {
            checks.push(check_persistence(persistence.last_error()));
        }

        HealthResponse::new(checks, inner.health.uptime())
    }

    /// Run one GC sweep now
    pub fn run_gc(&self) -> GcReport {
        self.inner.gc.run_once()
    }

    /// Write a snapshot now, bypassing the debounce
    pub async fn persist_now(&self) -> Result<usize> {
        match &self.inner.persistence {
            Some(persistence) => persistence.save(&self.inner.local).await,
            None => Ok(0),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.inner.health.is_ready()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn policies(&self) -> &PolicyRegistry {
        &self.inner.policies
    }

    pub fn metrics(&self) -> &Arc<CacheMetrics> {
        &self.inner.metrics
    }

    pub fn local(&self) -> &LocalStore {
        &self.inner.local
    }

    pub fn refreshes_in_flight(&self) -> usize {
        self.inner.in_flight.len()
    }
}

impl std::fmt::Debug for CacheEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEngine")
            .field("instance", &self.inner.config.instance_name)
            .field("entries", &self.inner.local.len())
            .field("distributed", &self.inner.distributed.is_some())
            .field("persistence", &self.inner.persistence.is_some())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
