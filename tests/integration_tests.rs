//! tiercache Integration Tests
//!
//! End-to-end behavior through the public API:
//! - Read path, write-through and expiry
//! - Stale-while-revalidate and refresh dedup
//! - Invalidation cascades
//! - Degradation when the distributed tier fails
//! - Snapshot persistence across restarts

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};

use tiercache::cache::{
    CachePolicy, CacheEngine, Clock, FailingBackend, Freshness, InMemoryDistributedBackend,
    InMemorySnapshotStore, ManualClock, Namespace, ReadSource,
};
use tiercache::EngineConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Product {
    price: u32,
}

fn ok<T>(value: T) -> anyhow::Result<T> {
    Ok(value)
}

/// Fetch that counts calls and returns `value`
fn counting_fetch(
    calls: Arc<AtomicUsize>,
    value: Product,
) -> impl Fn(String) -> BoxFuture<'static, anyhow::Result<Product>> + Send + Sync + 'static {
    move |_key| {
        calls.fetch_add(1, Ordering::SeqCst);
        let value = value.clone();
        async move { ok(value) }.boxed()
    }
}

/// Fetch that never completes
fn hanging_fetch(calls: Arc<AtomicUsize>) -> impl Fn(String) -> BoxFuture<'static, anyhow::Result<Product>> + Send + Sync + 'static {
    move |_key| {
        calls.fetch_add(1, Ordering::SeqCst);
        futures::future::pending().boxed()
    }
}

fn config_with(class: &str, policy: CachePolicy) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.policies.insert(class.to_string(), policy);
    config
}

async fn wait_for_refreshes(engine: &CacheEngine) {
    for _ in 0..100 {
        if engine.refreshes_in_flight() == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("refresh did not finish");
}

// =============================================================================
// Read and write path
// =============================================================================

mod read_write_tests {
    use super::*;
    use assert_matches::assert_matches;
    use tiercache::Error;

    #[tokio::test]
    async fn test_set_then_get_round_trip() {
        let engine = CacheEngine::builder(EngineConfig::default()).build().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));

        engine
            .set(Namespace::Products, "p1", &Product { price: 10 })
            .await
            .unwrap();
        let value = engine
            .get(Namespace::Products, "p1", counting_fetch(calls.clone(), Product { price: 99 }))
            .await
            .unwrap();

        assert_eq!(value, Product { price: 10 });
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_miss_fetches_once_then_hits() {
        let engine = CacheEngine::builder(EngineConfig::default()).build().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));

        let first = engine
            .get_traced(Namespace::Products, "p2", counting_fetch(calls.clone(), Product { price: 5 }))
            .await
            .unwrap();
        let second = engine
            .get_traced(Namespace::Products, "p2", counting_fetch(calls.clone(), Product { price: 6 }))
            .await
            .unwrap();

        assert_eq!(first.source, ReadSource::Origin);
        assert_eq!(second.source, ReadSource::Local);
        assert_eq!(second.value, Product { price: 5 });
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let stats = engine.statistics();
        assert_eq!(stats.entry_count, 1);
        assert_eq!(stats.origin_fetches, 1);
        assert_eq!(stats.hit_count, 1);
        assert_eq!(stats.miss_count, 1);
    }

    #[tokio::test]
    async fn test_fetch_receives_full_key() {
        let engine = CacheEngine::builder(EngineConfig::default()).build().unwrap();
        let key = engine
            .get(Namespace::Orders, "detail:O1", |key| async move { ok(key) })
            .await
            .unwrap();
        assert_eq!(key, "orders:detail:O1");
    }

    #[tokio::test]
    async fn test_origin_failure_propagates_and_is_not_cached() {
        let engine = CacheEngine::builder(EngineConfig::default()).build().unwrap();

        let result: tiercache::Result<Product> = engine
            .get(Namespace::Products, "p3", |_| async {
                Err::<Product, _>(anyhow::anyhow!("database unavailable"))
            })
            .await;

        assert_matches!(result, Err(Error::OriginFetchFailed { ref key, .. }) if key == "products:p3");
        assert!(engine.get_cached::<Product>(Namespace::Products, "p3").await.is_none());
    }

    #[tokio::test]
    async fn test_expiry_removes_entry() {
        let clock = ManualClock::starting_now();
        let engine = CacheEngine::builder(config_with("system:heartbeat", CachePolicy::new(1, 1)))
            .with_clock(clock.clone())
            .build()
            .unwrap();

        engine
            .set(Namespace::System, "heartbeat", &Product { price: 1 })
            .await
            .unwrap();
        assert_eq!(engine.statistics().entry_count, 1);

        clock.advance(Duration::from_millis(1100));
        assert!(engine.get_cached::<Product>(Namespace::System, "heartbeat").await.is_none());
        assert_eq!(engine.statistics().entry_count, 0);
    }

    #[tokio::test]
    async fn test_entry_too_large() {
        let policy = CachePolicy::new(60, 30).with_max_entry_size(16);
        let engine = CacheEngine::builder(config_with("profiles", policy)).build().unwrap();
        let large = "x".repeat(64);

        let result = engine.set(Namespace::Profiles, "U1", &large).await;
        assert_matches!(result, Err(Error::EntryTooLarge { limit: 16, .. }));

        // Read path still returns the fetched value
        let fetched = large.clone();
        let value = engine
            .get(Namespace::Profiles, "U2", move |_| {
                let fetched = fetched.clone();
                async move { ok(fetched) }
            })
            .await
            .unwrap();
        assert_eq!(value, large);
        assert_eq!(engine.statistics().entry_count, 0);
    }

    #[tokio::test]
    async fn test_remove() {
        let engine = CacheEngine::builder(EngineConfig::default()).build().unwrap();
        engine.set(Namespace::Products, "p1", &Product { price: 1 }).await.unwrap();

        assert!(engine.remove(Namespace::Products, "p1").await);
        assert!(!engine.remove(Namespace::Products, "p1").await);
        assert!(engine.get_cached::<Product>(Namespace::Products, "p1").await.is_none());
    }

    #[tokio::test]
    async fn test_compressed_class_round_trip() {
        let engine = CacheEngine::builder(EngineConfig::default()).build().unwrap();
        let catalog: Vec<String> = (0..300).map(|i| format!("dish-{}", i % 10)).collect();

        engine
            .set(Namespace::Products, "catalog:R1", &catalog)
            .await
            .unwrap();

        let stored = engine.statistics().total_size_bytes;
        assert!(stored < serde_json::to_vec(&catalog).unwrap().len() as u64);
        assert_eq!(
            engine.get_cached::<Vec<String>>(Namespace::Products, "catalog:R1").await,
            Some(catalog)
        );
    }
}

// =============================================================================
// Stale-while-revalidate
// =============================================================================

mod refresh_tests {
    use super::*;
    use tiercache::cache::CacheCounter;

    #[tokio::test]
    async fn test_concurrent_stale_reads_trigger_one_refresh() {
        let clock = ManualClock::starting_now();
        let engine = CacheEngine::builder(config_with("products", CachePolicy::new(10, 2)))
            .with_clock(clock.clone())
            .build()
            .unwrap();
        engine.set(Namespace::Products, "p1", &Product { price: 10 }).await.unwrap();

        clock.advance(Duration::from_secs(3));
        let calls = Arc::new(AtomicUsize::new(0));

        let reads = (0..10).map(|_| {
            engine.get_traced(
                Namespace::Products,
                "p1",
                counting_fetch(calls.clone(), Product { price: 11 }),
            )
        });
        let results = futures::future::join_all(reads).await;

        for result in results {
            let read = result.unwrap();
            assert_eq!(read.value, Product { price: 10 });
            assert_eq!(read.source, ReadSource::Local);
        }

        wait_for_refreshes(&engine).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(engine.metrics().get(CacheCounter::RefreshStarted), 1);

        let refreshed = engine
            .get_traced(Namespace::Products, "p1", counting_fetch(calls.clone(), Product { price: 12 }))
            .await
            .unwrap();
        assert_eq!(refreshed.value, Product { price: 11 });
        assert_eq!(refreshed.freshness, Freshness::Fresh);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_products_scenario() {
        let clock = ManualClock::starting_now();
        let engine = CacheEngine::builder(config_with("products", CachePolicy::new(60, 30)))
            .with_clock(clock.clone())
            .build()
            .unwrap();
        engine.set(Namespace::Products, "p1", &Product { price: 10 }).await.unwrap();
        let calls = Arc::new(AtomicUsize::new(0));

        // t=0: fresh
        let read = engine
            .get_traced(Namespace::Products, "p1", hanging_fetch(calls.clone()))
            .await
            .unwrap();
        assert_eq!(read.value, Product { price: 10 });
        assert_eq!(read.freshness, Freshness::Fresh);
        assert_eq!(engine.refreshes_in_flight(), 0);

        // t=45: stale, refresh scheduled
        clock.advance(Duration::from_secs(45));
        let read = engine
            .get_traced(Namespace::Products, "p1", hanging_fetch(calls.clone()))
            .await
            .unwrap();
        assert_eq!(read.value, Product { price: 10 });
        assert_eq!(read.freshness, Freshness::Stale);
        assert_eq!(engine.refreshes_in_flight(), 1);

        // t=61: refresh never completed, hard miss
        clock.advance(Duration::from_secs(16));
        assert!(engine.get_cached::<Product>(Namespace::Products, "p1").await.is_none());

        engine.shutdown().await;
        wait_for_refreshes(&engine).await;
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_stale_entry() {
        let clock = ManualClock::starting_now();
        let engine = CacheEngine::builder(config_with("products", CachePolicy::new(60, 30)))
            .with_clock(clock.clone())
            .build()
            .unwrap();
        engine.set(Namespace::Products, "p1", &Product { price: 10 }).await.unwrap();

        clock.advance(Duration::from_secs(45));
        let value = engine
            .get(Namespace::Products, "p1", |_| async {
                Err::<Product, _>(anyhow::anyhow!("origin timeout"))
            })
            .await
            .unwrap();
        assert_eq!(value, Product { price: 10 });

        wait_for_refreshes(&engine).await;
        assert_eq!(engine.metrics().get(CacheCounter::RefreshFailed), 1);
        assert_eq!(
            engine.get_cached::<Product>(Namespace::Products, "p1").await,
            Some(Product { price: 10 })
        );
    }

    #[tokio::test]
    async fn test_no_refresh_when_disabled() {
        let clock = ManualClock::starting_now();
        let policy = CachePolicy::new(60, 30).with_background_refresh(false);
        let engine = CacheEngine::builder(config_with("products", policy))
            .with_clock(clock.clone())
            .build()
            .unwrap();
        engine.set(Namespace::Products, "p1", &Product { price: 10 }).await.unwrap();

        clock.advance(Duration::from_secs(45));
        let calls = Arc::new(AtomicUsize::new(0));
        engine
            .get(Namespace::Products, "p1", counting_fetch(calls.clone(), Product { price: 1 }))
            .await
            .unwrap();

        assert_eq!(engine.refreshes_in_flight(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}

// =============================================================================
// Invalidation
// =============================================================================

mod invalidation_tests {
    use super::*;
    use tiercache::{MutationEvent, MutationKind};

    #[tokio::test]
    async fn test_order_cascade_spares_other_restaurant() {
        let engine = CacheEngine::builder(EngineConfig::default()).build().unwrap();
        for id in ["detail:O1", "list:R1:page=1", "list:R1:status=open", "list:R2:page=1"] {
            engine.set(Namespace::Orders, id, &id.to_string()).await.unwrap();
        }

        let report = engine.on_entity_mutated(&MutationEvent::order(MutationKind::Update, "O1", "R1"));
        assert_eq!(report.local_removed, 3);

        assert!(engine.get_cached::<String>(Namespace::Orders, "detail:O1").await.is_none());
        assert!(engine.get_cached::<String>(Namespace::Orders, "list:R1:page=1").await.is_none());
        assert!(engine
            .get_cached::<String>(Namespace::Orders, "list:R1:status=open")
            .await
            .is_none());
        assert_eq!(
            engine.get_cached::<String>(Namespace::Orders, "list:R2:page=1").await,
            Some("list:R2:page=1".to_string())
        );
    }

    #[tokio::test]
    async fn test_read_after_invalidation_returns_new_value() {
        let backend = Arc::new(InMemoryDistributedBackend::new());
        let engine = CacheEngine::builder(EngineConfig::default())
            .with_distributed_backend(backend.clone())
            .build()
            .unwrap();
        engine
            .set(Namespace::Orders, "detail:O1", &"old".to_string())
            .await
            .unwrap();

        engine.on_entity_mutated(&MutationEvent::order(MutationKind::Update, "O1", "R1"));
        let value = engine
            .get(Namespace::Orders, "detail:O1", |_| async { ok("new".to_string()) })
            .await
            .unwrap();
        assert_eq!(value, "new");

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(
            engine.get_cached::<String>(Namespace::Orders, "detail:O1").await,
            Some("new".to_string())
        );
    }

    #[tokio::test]
    async fn test_invalidation_reaches_distributed_tier() {
        let backend = Arc::new(InMemoryDistributedBackend::new());
        let engine = CacheEngine::builder(EngineConfig::default())
            .with_distributed_backend(backend.clone())
            .build()
            .unwrap();
        engine.set(Namespace::Profiles, "U1", &"alice".to_string()).await.unwrap();
        assert!(backend.contains("profiles:U1"));

        engine.invalidate(&MutationEvent::Profile {
            kind: MutationKind::Update,
            user_id: "U1".into(),
        });

        for _ in 0..100 {
            if !backend.contains("profiles:U1") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(!backend.contains("profiles:U1"));
        assert!(engine.get_cached::<String>(Namespace::Profiles, "U1").await.is_none());
    }
}

// =============================================================================
// Distributed tier
// =============================================================================

mod distributed_tests {
    use super::*;
    use tiercache::monitoring::HealthStatus;

    #[tokio::test]
    async fn test_reads_survive_failing_distributed_tier() {
        let engine = CacheEngine::builder(EngineConfig::default())
            .with_distributed_backend(Arc::new(FailingBackend::erroring()))
            .build()
            .unwrap();
        engine.init().await.unwrap();
        let calls = Arc::new(AtomicUsize::new(0));

        let first = engine
            .get(Namespace::Products, "p1", counting_fetch(calls.clone(), Product { price: 3 }))
            .await
            .unwrap();
        let second = engine
            .get_traced(Namespace::Products, "p1", counting_fetch(calls.clone(), Product { price: 4 }))
            .await
            .unwrap();

        assert_eq!(first, Product { price: 3 });
        assert_eq!(second.source, ReadSource::Local);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(engine.statistics().distributed_errors >= 2);

        let health = engine.health().await;
        assert_eq!(health.status, HealthStatus::Degraded);
        assert_eq!(
            health.check("distributed_tier").unwrap().status,
            HealthStatus::Degraded
        );
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_hanging_distributed_tier_is_bounded() {
        let mut config = EngineConfig::default();
        config.distributed_timeout_ms = 20;
        let engine = CacheEngine::builder(config)
            .with_distributed_backend(Arc::new(FailingBackend::hanging()))
            .build()
            .unwrap();

        let value = tokio::time::timeout(
            Duration::from_secs(2),
            engine.get(Namespace::Products, "p1", |_| async { ok(Product { price: 8 }) }),
        )
        .await
        .expect("read should not hang")
        .unwrap();
        assert_eq!(value, Product { price: 8 });
    }

    #[tokio::test]
    async fn test_second_instance_reads_from_distributed_tier() {
        let backend = Arc::new(InMemoryDistributedBackend::new());
        let first = CacheEngine::builder(EngineConfig::default())
            .with_distributed_backend(backend.clone())
            .build()
            .unwrap();
        let second = CacheEngine::builder(EngineConfig::default())
            .with_distributed_backend(backend.clone())
            .build()
            .unwrap();
        let calls = Arc::new(AtomicUsize::new(0));

        first
            .get(Namespace::Products, "p7", counting_fetch(calls.clone(), Product { price: 7 }))
            .await
            .unwrap();
        let read = second
            .get_traced(Namespace::Products, "p7", counting_fetch(calls.clone(), Product { price: 70 }))
            .await
            .unwrap();

        assert_eq!(read.source, ReadSource::Distributed);
        assert_eq!(read.value, Product { price: 7 });
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Promoted into the second instance's local tier
        let again = second
            .get_traced(Namespace::Products, "p7", counting_fetch(calls.clone(), Product { price: 70 }))
            .await
            .unwrap();
        assert_eq!(again.source, ReadSource::Local);
    }
}

// =============================================================================
// Persistence
// =============================================================================

mod persistence_tests {
    use super::*;

    #[tokio::test]
    async fn test_restore_from_snapshot_store() {
        let snapshots = Arc::new(InMemorySnapshotStore::new());

        let before = CacheEngine::builder(EngineConfig::default())
            .with_snapshot_store(snapshots.clone())
            .build()
            .unwrap();
        before.init().await.unwrap();
        before.set(Namespace::Products, "p1", &Product { price: 10 }).await.unwrap();
        before.set(Namespace::Profiles, "U1", &"alice".to_string()).await.unwrap();
        before.shutdown().await;
        assert!(snapshots.raw().is_some());

        let after = CacheEngine::builder(EngineConfig::default())
            .with_snapshot_store(snapshots.clone())
            .build()
            .unwrap();
        after.init().await.unwrap();

        assert_eq!(after.statistics().entry_count, 2);
        assert_eq!(
            after.get_cached::<Product>(Namespace::Products, "p1").await,
            Some(Product { price: 10 })
        );
        after.shutdown().await;
    }

    #[tokio::test]
    async fn test_expired_entries_not_restored() {
        let clock = ManualClock::starting_now();
        let snapshots = Arc::new(InMemorySnapshotStore::new());
        let config = config_with("system:health", CachePolicy::new(30, 10));

        let before = CacheEngine::builder(config.clone())
            .with_clock(clock.clone())
            .with_snapshot_store(snapshots.clone())
            .build()
            .unwrap();
        before.set(Namespace::System, "health", &"ok".to_string()).await.unwrap();
        before.set(Namespace::Profiles, "U1", &"alice".to_string()).await.unwrap();
        assert_eq!(before.persist_now().await.unwrap(), 2);

        clock.advance(Duration::from_secs(31));
        let after = CacheEngine::builder(config)
            .with_clock(clock.clone())
            .with_snapshot_store(snapshots)
            .build()
            .unwrap();
        after.init().await.unwrap();

        assert_eq!(after.statistics().entry_count, 1);
        assert!(after.get_cached::<String>(Namespace::System, "health").await.is_none());
        after.shutdown().await;
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_starts_empty() {
        let snapshots = Arc::new(InMemorySnapshotStore::new());
        snapshots.set_raw(b"\x00\x01garbage".to_vec());

        let engine = CacheEngine::builder(EngineConfig::default())
            .with_snapshot_store(snapshots)
            .build()
            .unwrap();
        engine.init().await.unwrap();

        assert!(engine.is_ready());
        assert_eq!(engine.statistics().entry_count, 0);
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_file_persistence_across_restart() {
        let dir = std::env::temp_dir().join(format!(
            "tiercache-it-{}-{}",
            std::process::id(),
            chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));
        let mut config = EngineConfig::default();
        config.instance_name = "restart-test".into();
        config.persistence_dir = Some(dir.clone());

        let before = CacheEngine::builder(config.clone()).build().unwrap();
        before.init().await.unwrap();
        before.set(Namespace::Orders, "detail:O1", &Product { price: 42 }).await.unwrap();
        before.shutdown().await;
        assert!(dir.join("restart-test.tiercache.json").exists());

        let after = CacheEngine::builder(config).build().unwrap();
        after.init().await.unwrap();
        assert_eq!(
            after.get_cached::<Product>(Namespace::Orders, "detail:O1").await,
            Some(Product { price: 42 })
        );
        after.shutdown().await;

        let _ = std::fs::remove_dir_all(&dir);
    }
}

// =============================================================================
// Lifecycle, GC and warming
// =============================================================================

mod lifecycle_tests {
    use super::*;
    use async_trait::async_trait;
    use tiercache::cache::Warmer;

    struct CatalogWarmer;

    #[async_trait]
    impl Warmer for CatalogWarmer {
        fn keys(&self) -> Vec<String> {
            vec!["catalog:R1".into(), "catalog:R2".into(), "catalog:broken".into()]
        }

        async fn fetch(&self, id: &str) -> anyhow::Result<serde_json::Value> {
            if id.ends_with("broken") {
                anyhow::bail!("menu service returned 500");
            }
            Ok(serde_json::json!({ "id": id, "items": ["pizza", "pasta"] }))
        }
    }

    #[tokio::test]
    async fn test_warm_namespace() {
        let engine = CacheEngine::builder(EngineConfig::default())
            .with_warmer(Namespace::Products, Arc::new(CatalogWarmer))
            .build()
            .unwrap();

        let report = engine.warm(Namespace::Products).await;
        assert_eq!(report.attempted, 3);
        assert_eq!(report.loaded, 2);
        assert_eq!(report.failed, 1);

        let again = engine.warm(Namespace::Products).await;
        assert_eq!(again.skipped, 2);
        assert_eq!(again.loaded, 0);

        let cached: serde_json::Value = engine
            .get_cached(Namespace::Products, "catalog:R1")
            .await
            .unwrap();
        assert_eq!(cached["items"][0], "pizza");

        assert_eq!(engine.warm(Namespace::Orders).await.attempted, 0);
    }

    #[tokio::test]
    async fn test_gc_sweeps_expired_entries() {
        let clock = ManualClock::starting_now();
        let engine = CacheEngine::builder(config_with("system:health", CachePolicy::new(30, 10)))
            .with_clock(clock.clone())
            .build()
            .unwrap();
        engine.set(Namespace::System, "health", &"ok".to_string()).await.unwrap();
        engine.set(Namespace::Profiles, "U1", &"alice".to_string()).await.unwrap();

        clock.advance(Duration::from_secs(31));
        let report = engine.run_gc();
        assert_eq!(report.removed_count, 1);
        assert_eq!(report.run_timestamp, clock.now());

        let stats = engine.statistics();
        assert_eq!(stats.entry_count, 1);
        assert_eq!(stats.gc_runs, 1);
        assert_eq!(stats.last_gc_removed, Some(1));
    }

    #[tokio::test]
    async fn test_init_and_shutdown_toggle_readiness() {
        let engine = CacheEngine::builder(EngineConfig::default()).build().unwrap();
        assert!(!engine.is_ready());

        engine.init().await.unwrap();
        engine.init().await.unwrap();
        assert!(engine.is_ready());

        engine.shutdown().await;
        assert!(!engine.is_ready());
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let mut config = EngineConfig::default();
        config.max_cache_size_bytes = 0;
        assert!(CacheEngine::builder(config).build().is_err());
    }
}

// =============================================================================
// Telemetry
// =============================================================================

mod telemetry_tests {
    use super::*;
    use prometheus::{Encoder, TextEncoder};
    use tiercache::cache::PrometheusSink;

    #[tokio::test]
    async fn test_prometheus_sink_receives_events() {
        let sink = Arc::new(PrometheusSink::new().unwrap());
        let engine = CacheEngine::builder(EngineConfig::default())
            .with_metrics_sink(sink.clone())
            .build()
            .unwrap();

        engine
            .get(Namespace::Products, "p1", |_| async { ok(Product { price: 1 }) })
            .await
            .unwrap();
        engine
            .get(Namespace::Products, "p1", |_| async { ok(Product { price: 1 }) })
            .await
            .unwrap();

        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&sink.registry().gather(), &mut buffer)
            .unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.contains("tiercache_events_total{event=\"hit\"} 1"));
        assert!(text.contains("tiercache_events_total{event=\"miss\"} 1"));
        assert!(text.contains("tiercache_events_total{event=\"origin_fetch\"} 1"));
    }
}
