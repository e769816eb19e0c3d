//! tiercache daemon
//!
//! Runs a cache engine with its background collector and persister, and
//! exposes Prometheus metrics and health probes over HTTP.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       tiercache                              │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐   │
//! │  │ Local Store  │───▶│ Distributed  │    │  Snapshot    │   │
//! │  │  + GC        │    │ (mem/redis)  │    │  Persister   │   │
//! │  └──────────────┘    └──────────────┘    └──────────────┘   │
//! │        /metrics :8080            /healthz /readyz :8081      │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus::{Encoder, IntGauge, TextEncoder};
use tokio::net::TcpListener;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tiercache::cache::{
    CacheEngine, CacheKey, DistributedBackend, InMemoryDistributedBackend, LoggingSink, Namespace,
    PrometheusSink, Warmer,
};
use tiercache::EngineConfig;

// =============================================================================
// CLI Arguments
// =============================================================================

/// tiercache - multi-tier cache engine daemon
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML configuration file
    #[arg(long, env = "TIERCACHE_CONFIG")]
    config: Option<PathBuf>,

    /// Instance name (overrides config)
    #[arg(long, env = "TIERCACHE_INSTANCE")]
    instance: Option<String>,

    /// Snapshot directory (overrides config)
    #[arg(long, env = "TIERCACHE_PERSISTENCE_DIR")]
    persistence_dir: Option<PathBuf>,

    /// Local store capacity in bytes (overrides config)
    #[arg(long, env = "TIERCACHE_MAX_CACHE_SIZE_BYTES")]
    max_cache_size_bytes: Option<u64>,

    /// Redis URL for the distributed tier; an in-memory tier is used otherwise
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,

    /// JSON file of `{"namespace:id": value}` used to warm the cache at startup
    #[arg(long, env = "TIERCACHE_SEED_FILE")]
    seed_file: Option<PathBuf>,

    /// Namespaces to warm at startup (repeatable)
    #[arg(long = "warm")]
    warm: Vec<Namespace>,

    /// Metrics server bind address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: String,

    /// Health server bind address
    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:8081")]
    health_addr: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args);

    let config = load_config(&args)?;
    info!("Starting tiercache");
    info!("  Instance: {}", config.instance_name);
    info!("  Capacity: {} bytes", config.max_cache_size_bytes);
    info!("  GC interval: {}s", config.gc_interval_secs);
    info!(
        "  Persistence: {}",
        config
            .persistence_dir
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "disabled".into())
    );

    let prometheus = Arc::new(PrometheusSink::new().context("creating Prometheus registry")?);
    let backend = distributed_backend(&args).await?;

    let mut builder = CacheEngine::builder(config)
        .with_distributed_backend(backend)
        .with_metrics_sink(prometheus.clone())
        .with_metrics_sink(Arc::new(LoggingSink));

    if let Some(path) = &args.seed_file {
        for (namespace, warmer) in SeedWarmer::load(path)? {
            builder = builder.with_warmer(namespace, Arc::new(warmer));
        }
    }

    let engine = builder.build()?;
    engine.init().await?;

    for namespace in &args.warm {
        let report = engine.warm(*namespace).await;
        if report.failed > 0 {
            warn!(%namespace, failed = report.failed, "Warming incomplete");
        }
    }

    // Start health server
    let health_addr = args.health_addr.clone();
    let health_engine = engine.clone();
    tokio::spawn(async move {
        if let Err(e) = run_health_server(&health_addr, health_engine).await {
            error!("Health server error: {}", e);
        }
    });

    // Start metrics server
    let metrics_addr = args.metrics_addr.clone();
    let metrics_engine = engine.clone();
    tokio::spawn(async move {
        if let Err(e) = run_metrics_server(&metrics_addr, metrics_engine, prometheus).await {
            error!("Metrics server error: {}", e);
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("Shutdown signal received");

    engine.shutdown().await;
    info!("tiercache shutdown complete");
    Ok(())
}

fn load_config(args: &Args) -> anyhow::Result<EngineConfig> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::from_yaml_file(path)?,
        None => EngineConfig::default(),
    };
    if let Some(instance) = &args.instance {
        config.instance_name = instance.clone();
    }
    if let Some(dir) = &args.persistence_dir {
        config.persistence_dir = Some(dir.clone());
    }
    if let Some(bytes) = args.max_cache_size_bytes {
        config.max_cache_size_bytes = bytes;
    }
    config.validate()?;
    Ok(config)
}

#[cfg(feature = "redis")]
async fn distributed_backend(args: &Args) -> anyhow::Result<Arc<dyn DistributedBackend>> {
    match &args.redis_url {
        Some(url) => Ok(Arc::new(tiercache::cache::RedisBackend::connect(url).await?)),
        None => Ok(Arc::new(InMemoryDistributedBackend::new())),
    }
}

#[cfg(not(feature = "redis"))]
async fn distributed_backend(args: &Args) -> anyhow::Result<Arc<dyn DistributedBackend>> {
    if args.redis_url.is_some() {
        warn!("Built without the `redis` feature, using the in-memory distributed tier");
    }
    Ok(Arc::new(InMemoryDistributedBackend::new()))
}

// =============================================================================
// Seed Warmer
// =============================================================================

/// Warm values read from a JSON seed file, one warmer per namespace
struct SeedWarmer {
    values: BTreeMap<String, serde_json::Value>,
}

impl SeedWarmer {
    fn load(path: &PathBuf) -> anyhow::Result<Vec<(Namespace, SeedWarmer)>> {
        let raw = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        let seeds: BTreeMap<String, serde_json::Value> =
            serde_json::from_slice(&raw).with_context(|| format!("parsing {}", path.display()))?;

        let mut by_namespace: BTreeMap<Namespace, BTreeMap<String, serde_json::Value>> =
            BTreeMap::new();
        for (raw_key, value) in seeds {
            match CacheKey::parse(&raw_key) {
                Some(key) => {
                    by_namespace
                        .entry(key.namespace())
                        .or_default()
                        .insert(key.id().to_string(), value);
                }
                None => warn!(key = %raw_key, "Ignoring seed with unknown namespace"),
            }
        }

        Ok(by_namespace
            .into_iter()
            .map(|(namespace, values)| (namespace, SeedWarmer { values }))
            .collect())
    }
}

#[async_trait]
impl Warmer for SeedWarmer {
    fn keys(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }

    async fn fetch(&self, id: &str) -> anyhow::Result<serde_json::Value> {
        self.values
            .get(id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no seed value for {}", id))
    }
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "redis=warn"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

// =============================================================================
// HTTP helpers
// =============================================================================

fn respond(status: StatusCode, content_type: &str, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    if let Ok(value) = content_type.parse() {
        response.headers_mut().insert(hyper::header::CONTENT_TYPE, value);
    }
    response
}

async fn bind(addr: &str, what: &str) -> anyhow::Result<TcpListener> {
    let addr: SocketAddr = addr
        .parse()
        .with_context(|| format!("invalid {} server address {}", what, addr))?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {} server", what))?;
    info!("{} server listening on {}", what, addr);
    Ok(listener)
}

// =============================================================================
// Health Server
// =============================================================================

async fn health_handler(
    req: Request<hyper::body::Incoming>,
    engine: CacheEngine,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let response = match req.uri().path() {
        "/healthz" | "/livez" => respond(StatusCode::OK, "text/plain", "ok"),
        "/readyz" => {
            if engine.is_ready() {
                respond(StatusCode::OK, "text/plain", "ok")
            } else {
                respond(StatusCode::SERVICE_UNAVAILABLE, "text/plain", "not ready")
            }
        }
        "/health" => {
            let health = engine.health().await;
            let status = if health.status.is_operational() {
                StatusCode::OK
            } else {
                StatusCode::SERVICE_UNAVAILABLE
            };
            match serde_json::to_vec(&health) {
                Ok(body) => respond(status, "application/json", body),
                Err(e) => respond(StatusCode::INTERNAL_SERVER_ERROR, "text/plain", e.to_string()),
            }
        }
        _ => respond(StatusCode::NOT_FOUND, "text/plain", "not found"),
    };
    Ok(response)
}

async fn run_health_server(addr: &str, engine: CacheEngine) -> anyhow::Result<()> {
    let listener = bind(addr, "Health").await?;

    loop {
        let (stream, _) = listener.accept().await.context("health server accept")?;
        let io = TokioIo::new(stream);
        let engine = engine.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req| health_handler(req, engine.clone()));
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                error!("Health server connection error: {}", e);
            }
        });
    }
}

// =============================================================================
// Metrics Server
// =============================================================================

struct MetricsState {
    engine: CacheEngine,
    sink: Arc<PrometheusSink>,
    entries: IntGauge,
    bytes: IntGauge,
}

fn render_metrics(state: &MetricsState) -> Response<Full<Bytes>> {
    let stats = state.engine.statistics();
    state.entries.set(stats.entry_count as i64);
    state.bytes.set(stats.total_size_bytes as i64);

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    match encoder.encode(&state.sink.registry().gather(), &mut buffer) {
        Ok(()) => respond(StatusCode::OK, encoder.format_type(), buffer),
        Err(e) => respond(StatusCode::INTERNAL_SERVER_ERROR, "text/plain", e.to_string()),
    }
}

async fn run_metrics_server(
    addr: &str,
    engine: CacheEngine,
    sink: Arc<PrometheusSink>,
) -> anyhow::Result<()> {
    let entries = IntGauge::new("tiercache_local_entries", "Entries resident in the local store")?;
    let bytes = IntGauge::new("tiercache_local_bytes", "Payload bytes resident in the local store")?;
    sink.registry().register(Box::new(entries.clone()))?;
    sink.registry().register(Box::new(bytes.clone()))?;

    let state = Arc::new(MetricsState {
        engine,
        sink,
        entries,
        bytes,
    });
    let listener = bind(addr, "Metrics").await?;

    loop {
        let (stream, _) = listener.accept().await.context("metrics server accept")?;
        let io = TokioIo::new(stream);
        let state = state.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                let state = state.clone();
                async move {
                    let response = match req.uri().path() {
                        "/metrics" => render_metrics(&state),
                        _ => respond(StatusCode::NOT_FOUND, "text/plain", "not found"),
                    };
                    Ok::<_, Infallible>(response)
                }
            });
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                error!("Metrics server connection error: {}", e);
            }
        });
    }
}
