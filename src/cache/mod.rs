//! Multi-Tier Cache Engine
//!
//! Read-through caching with a bounded local tier, an optional distributed
//! tier and crash-safe snapshots.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                           Cache Engine                                    │
//! ├──────────────────────────────────────────────────────────────────────────┤
//! │  Local Store (RAM)    │ Distributed Store    │ Origin (caller fetch)      │
//! │  ┌────────────────┐   │ ┌────────────────┐   │ ┌────────────────────┐     │
//! │  │ HashMap + LRU  │   │ │ Redis / memory │   │ │ fetch(key) -> T    │     │
//! │  │ byte ceiling   │   │ │ timeout-bound  │   │ │                    │     │
//! │  └────────────────┘   │ └────────────────┘   │ └────────────────────┘     │
//! │         │             │         │            │           │                │
//! │         └─────────────┴─────────┴────────────┴───────────┘                │
//! │                              │                                            │
//! │        Policy Registry · Invalidation Router · GC · Persistence           │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Freshness
//!
//! - `stale_at = created_at + stale_window`, clamped to `expires_at`
//! - Fresh while `now <= stale_at`, served stale with a background refresh
//!   while `now <= expires_at`, a miss afterwards
//!
//! # Failure model
//!
//! Only origin failures and oversized entries reach callers. Distributed tier
//! outages, corrupt snapshots and undecodable values degrade to cache misses.

pub mod clock;
pub mod codec;
pub mod compression;
pub mod distributed;
pub mod engine;
pub mod entry;
pub mod gc;
pub mod invalidation;
pub mod local;
pub mod metrics;
pub mod persistence;
pub mod policy;
#[cfg(feature = "redis")]
pub mod redis_backend;

pub use clock::{Clock, ManualClock, SystemClock};
pub use compression::{CompressionAlgorithm, CompressionConfig, CompressionManager, Compressor};
pub use distributed::{
    DistributedBackend, DistributedRecord, DistributedStore, FailingBackend,
    InMemoryDistributedBackend,
};
pub use engine::{
    CacheEngine, CacheEngineBuilder, CacheRead, ReadSource, Statistics, WarmReport, Warmer,
};
pub use entry::{CacheEntry, CacheKey, Freshness, Namespace};
pub use gc::{GarbageCollector, GcReport};
pub use invalidation::{
    EntityKind, InvalidationLedger, InvalidationReport, InvalidationRouter, InvalidationRule,
    InvalidationTarget, LedgerWatch, MutationEvent, MutationKind,
};
pub use local::{LocalStore, LocalStoreConfig, LocalStoreStats};
pub use metrics::{CacheCounter, CacheMetrics, LoggingSink, MetricsSink, NoopSink, PrometheusSink};
pub use persistence::{FileSnapshotStore, InMemorySnapshotStore, PersistenceAdapter, SnapshotStore};
pub use policy::{CachePolicy, PolicyRegistry};
#[cfg(feature = "redis")]
pub use redis_backend::RedisBackend;

/// Default local store capacity (64 MiB)
pub const DEFAULT_MAX_CACHE_SIZE_BYTES: u64 = 64 * 1024 * 1024;

// =============================================================================
// Tests
// =============================================================================
