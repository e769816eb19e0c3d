//! Garbage collector for the local store
//!
//! Hard-expired entries are already dropped lazily on read; the collector
//! catches the ones nobody reads again.
//!
//! # Example
//!
//! ```ignore
//! let gc = GarbageCollector::new(local, clock, metrics)
//!     .with_interval(Duration::from_secs(60));
//! tokio::spawn(gc.run(shutdown_token));
//! ```

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::clock::Clock;
use super::local::LocalStore;
use super::metrics::{CacheCounter, CacheMetrics};

/// Default interval between sweeps (5 minutes)
pub const DEFAULT_GC_INTERVAL_SECS: u64 = 300;

/// Result of one sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcReport {
    pub removed_count: usize,
    pub run_timestamp: DateTime<Utc>,
}

/// Periodic expiry sweeper
pub struct GarbageCollector {
    local: Arc<LocalStore>,
    clock: Arc<dyn Clock>,
    metrics: Arc<CacheMetrics>,
    interval: Duration,
    last_report: Mutex<Option<GcReport>>,
}

impl GarbageCollector {
    pub fn new(local: Arc<LocalStore>, clock: Arc<dyn Clock>, metrics: Arc<CacheMetrics>) -> Self {
        Self {
            local,
            clock,
            metrics,
            interval: Duration::from_secs(DEFAULT_GC_INTERVAL_SECS),
            last_report: Mutex::new(None),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Sweep once.
    ///
    /// A panic inside the sweep is caught and logged; the report then shows
    /// nothing removed.
    pub fn run_once(&self) -> GcReport {
        let now = self.clock.now();
        let removed_count = match catch_unwind(AssertUnwindSafe(|| self.local.sweep_expired(now))) {
            Ok(removed) => removed,
            Err(_) => {
                error!("Expiry sweep panicked, continuing");
                0
            }
        };

        self.metrics.record(CacheCounter::GcRun);
        let report = GcReport {
            removed_count,
            run_timestamp: now,
        };
        *self.last_report.lock() = Some(report);

        debug!(removed = removed_count, remaining = self.local.len(), "GC sweep finished");
        report
    }

    pub fn last_report(&self) -> Option<GcReport> {
        *self.last_report.lock()
    }

    /// Sweep on every interval tick until shutdown is signalled
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!(interval_secs = self.interval.as_secs(), "Garbage collector starting");

        let mut interval = tokio::time::interval(self.interval);
        // Skip the first immediate tick
        interval.tick().await;

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Garbage collector shutting down");
                    break;
                }

                _ = interval.tick() => {
                    self.run_once();
                }
            }
        }
    }
}
