//! tiercache - Multi-Tier Cache and Invalidation Engine
//!
//! Sits between an application's data-access layer and its backing store to
//! cut read latency and origin load for frequently read, moderately volatile
//! entities, with bounded staleness per entity class.
//!
//! # Architecture
//!
//! ```text
//! get(ns, id, fetch) → Local Store → Distributed Store → Origin fetch
//!                           ▲                ▲
//!        mutation event → Invalidation Router
//! ```
//!
//! # Features
//!
//! - Per-class TTL and stale-window policies
//! - Bounded local store with batched LRU eviction
//! - Optional distributed tier (in-memory or Redis) that degrades to a miss
//! - Stale-while-revalidate with one background refresh per key
//! - Rule-based invalidation cascades from typed mutation events
//! - Periodic expiry sweeps
//! - Debounced JSON snapshots restored on startup
//! - Prometheus counters and component health checks
//!
//! # Modules
//!
//! - [`cache`] - Engine, tiers, policies, invalidation, GC and persistence
//! - [`config`] - YAML-backed engine configuration
//! - [`error`] - Error types
//! - [`monitoring`] - Health reporting

pub mod cache;
pub mod config;
pub mod error;
pub mod monitoring;

// Re-export commonly used types
pub use cache::{
    CacheEngine, CachePolicy, CacheKey, EntityKind, MutationEvent, MutationKind, Namespace,
    Statistics,
};
pub use config::EngineConfig;
pub use error::{Error, Result};
