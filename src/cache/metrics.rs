//! Cache Metrics Collection
//!
//! Atomic counters for the engine's own statistics, fanned out to any number
//! of registered [`MetricsSink`]s (Prometheus, logs, …).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use prometheus::{IntCounterVec, Opts, Registry};

/// Counters emitted by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheCounter {
    /// Local fresh or stale hit
    Hit,
    /// Served from the local store after the stale window
    StaleHit,
    /// Local miss
    Miss,
    /// Found in the distributed tier after a local miss
    DistributedHit,
    /// Distributed call failed or timed out
    DistributedError,
    /// Origin fetch invoked
    OriginFetch,
    /// Origin fetch failed
    OriginError,
    /// Entry evicted under capacity pressure
    Eviction,
    /// Expired entry removed lazily or by GC
    Expiration,
    /// GC sweep completed
    GcRun,
    /// Background refresh scheduled
    RefreshStarted,
    /// Background refresh failed
    RefreshFailed,
    /// Key or prefix removed by invalidation
    Invalidation,
    /// Snapshot written
    PersistenceSave,
    /// Snapshot read/write failed
    PersistenceError,
    /// Payload could not be encoded/decoded
    SerializationError,
}

impl CacheCounter {
    /// All counters
    pub const ALL: [CacheCounter; 16] = [
        CacheCounter::Hit,
        CacheCounter::StaleHit,
        CacheCounter::Miss,
        CacheCounter::DistributedHit,
        CacheCounter::DistributedError,
        CacheCounter::OriginFetch,
        CacheCounter::OriginError,
        CacheCounter::Eviction,
        CacheCounter::Expiration,
        CacheCounter::GcRun,
        CacheCounter::RefreshStarted,
        CacheCounter::RefreshFailed,
        CacheCounter::Invalidation,
        CacheCounter::PersistenceSave,
        CacheCounter::PersistenceError,
        CacheCounter::SerializationError,
    ];

    /// Stable label value
    pub fn name(&self) -> &'static str {
        match self {
            CacheCounter::Hit => "hit",
            CacheCounter::StaleHit => "stale_hit",
            CacheCounter::Miss => "miss",
            CacheCounter::DistributedHit => "distributed_hit",
            CacheCounter::DistributedError => "distributed_error",
            CacheCounter::OriginFetch => "origin_fetch",
            CacheCounter::OriginError => "origin_error",
            CacheCounter::Eviction => "eviction",
            CacheCounter::Expiration => "expiration",
            CacheCounter::GcRun => "gc_run",
            CacheCounter::RefreshStarted => "refresh_started",
            CacheCounter::RefreshFailed => "refresh_failed",
            CacheCounter::Invalidation => "invalidation",
            CacheCounter::PersistenceSave => "persistence_save",
            CacheCounter::PersistenceError => "persistence_error",
            CacheCounter::SerializationError => "serialization_error",
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

impl std::fmt::Display for CacheCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Sinks
// =============================================================================

/// External telemetry target
pub trait MetricsSink: Send + Sync {
    /// Add `value` to `counter`
    fn increment(&self, counter: CacheCounter, value: u64);
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl MetricsSink for NoopSink {
    fn increment(&self, _counter: CacheCounter, _value: u64) {}
}

/// Emits every increment as a `trace!` event
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingSink;

impl MetricsSink for LoggingSink {
    fn increment(&self, counter: CacheCounter, value: u64) {
        tracing::trace!(counter = %counter, value, "Cache counter");
    }
}

/// Prometheus counter vector `tiercache_events_total{event}`
#[derive(Clone)]
pub struct PrometheusSink {
    registry: Registry,
    events: IntCounterVec,
}

impl PrometheusSink {
    /// Create a sink with its own registry
    pub fn new() -> prometheus::Result<Self> {
        Self::with_registry(Registry::new())
    }

    /// Create a sink registering into `registry`
    pub fn with_registry(registry: Registry) -> prometheus::Result<Self> {
        let events = IntCounterVec::new(
            Opts::new("tiercache_events_total", "Cache engine events by type"),
            &["event"],
        )?;
        registry.register(Box::new(events.clone()))?;
        Ok(Self { registry, events })
    }

    /// Registry the counters live in
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Current value of one counter
    pub fn get(&self, counter: CacheCounter) -> u64 {
        self.events.with_label_values(&[counter.name()]).get()
    }
}

impl MetricsSink for PrometheusSink {
    fn increment(&self, counter: CacheCounter, value: u64) {
        self.events
            .with_label_values(&[counter.name()])
            .inc_by(value);
    }
}

// =============================================================================
// Collector
// =============================================================================

/// Engine-wide counters
pub struct CacheMetrics {
    counters: [AtomicU64; 16],
    sinks: Vec<Arc<dyn MetricsSink>>,
}

impl Default for CacheMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheMetrics {
    /// Collector without external sinks
    pub fn new() -> Self {
        Self::with_sinks(Vec::new())
    }

    /// Collector forwarding to `sinks`
    pub fn with_sinks(sinks: Vec<Arc<dyn MetricsSink>>) -> Self {
        Self {
            counters: std::array::from_fn(|_| AtomicU64::new(0)),
            sinks,
        }
    }

    /// Add `value` to `counter`
    pub fn add(&self, counter: CacheCounter, value: u64) {
        if value == 0 {
            return;
        }
        self.counters[counter.index()].fetch_add(value, Ordering::Relaxed);
        for sink in &self.sinks {
            sink.increment(counter, value);
        }
    }

    /// Add one to `counter`
    #[inline]
    pub fn record(&self, counter: CacheCounter) {
        self.add(counter, 1);
    }

    /// Current value
    pub fn get(&self, counter: CacheCounter) -> u64 {
        self.counters[counter.index()].load(Ordering::Relaxed)
    }

    /// Local hit ratio (stale hits count as hits)
    pub fn hit_ratio(&self) -> f64 {
        let hits = self.get(CacheCounter::Hit) as f64;
        let total = hits + self.get(CacheCounter::Miss) as f64;
        if total == 0.0 {
            0.0
        } else {
            hits / total
        }
    }

    /// Reset all counters (sinks are not reset)
    pub fn reset(&self) {
        for counter in &self.counters {
            counter.store(0, Ordering::Relaxed);
        }
    }

    /// Number of registered sinks
    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }
}

impl std::fmt::Debug for CacheMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("CacheMetrics");
        for counter in CacheCounter::ALL {
            s.field(counter.name(), &self.get(counter));
        }
        s.finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
