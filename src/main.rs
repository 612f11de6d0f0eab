// Main entry point for the todos API

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info};

use todos_api::api::{create_router, AppState};
use todos_api::config::{CacheBackend, Config};
use todos_api::core::health::HealthReporter;
use todos_api::core::metrics::Metrics;
use todos_api::core::resilience::BreakerListener;
use todos_api::core::traits::CacheClient;
use todos_api::infra::event_publisher::{EventPublisher, RedisEventChannel};
use todos_api::infra::postgres_store::PostgresTodoCollection;
use todos_api::state::cache_aside::CacheAsideStore;
use todos_api::state::gateway::StoreGateway;
use todos_api::state::memory_cache::MemoryCache;
use todos_api::state::redis_cache::{self, RedisCache};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load and validate configuration first (before any logging)
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // 2. Initialize tracing subscriber; may only happen once per process
    init_tracing(&config)?;

    info!("Starting todos API");
    info!(
        bind_address = %config.bind_address,
        port = config.port,
        cache_backend = ?config.cache_backend,
        "Configuration loaded"
    );

    // 3. Redis carries the log channel, and the cache unless the memory backend is chosen
    let redis_manager = redis_cache::connect(
        &config.redis_url,
        Duration::from_secs(config.redis_connection_timeout_secs),
    )
    .await
    .context("Failed to initialize Redis")?;
    info!("Redis connection initialized");

    let redis_operation_timeout = Duration::from_millis(config.redis_operation_timeout_ms);
    let cache: Arc<dyn CacheClient> = match config.cache_backend {
        CacheBackend::Redis => Arc::new(RedisCache::new(
            redis_manager.clone(),
            redis_operation_timeout,
        )),
        CacheBackend::Memory => Arc::new(MemoryCache::new(config.cache_max_capacity)),
    };

    let publisher = Arc::new(
        EventPublisher::new(
            Arc::new(RedisEventChannel::new(redis_manager, redis_operation_timeout)),
            config.redis_channel.clone(),
        )
        .with_timeout(redis_operation_timeout),
    );

    // 4. Durable store
    let collection = PostgresTodoCollection::connect(
        &config.database_url,
        config.db_max_connections,
        config.circuit_breaker.timeout,
    )
    .await
    .context("Failed to connect to database")?;
    collection
        .ensure_schema()
        .await
        .context("Failed to prepare todos schema")?;
    info!("Database pool initialized");

    // 5. Breakers, observed by metrics and by the health reporter
    let metrics = Arc::new(Metrics::new().context("Failed to register metrics")?);
    let listeners = vec![metrics.clone() as Arc<dyn BreakerListener>];
    let gateway = Arc::new(StoreGateway::with_listeners(
        Arc::new(collection),
        config.circuit_breaker.clone(),
        listeners,
    ));
    let health = Arc::new(HealthReporter::new(gateway.breakers()));

    let store = Arc::new(
        CacheAsideStore::new(gateway, cache, publisher)
            .with_ttl(config.cache_ttl())
            .with_metrics(metrics.clone()),
    );

    let app_state = AppState {
        store,
        health,
        metrics,
        config: Arc::new(config.clone()),
    };

    let router = create_router(&app_state).with_state(app_state);
    info!("Router created");

    // 6. Start HTTP server
    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to address {}", addr))?;

    info!(addr = %addr, "Server listening on {}", addr);

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| {
            error!(error = %e, "Server error");
            e
        })?;

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing subscriber based on configuration
///
/// `RUST_LOG` takes precedence over `LOG_LEVEL`.
fn init_tracing(config: &Config) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = fmt()
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_env_filter(filter);

    let result = if config.log_format == "json" {
        subscriber.json().try_init()
    } else {
        subscriber.try_init()
    };

    result.map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Ctrl+C received, starting graceful shutdown");
        },
        _ = terminate => {
            info!("SIGTERM received, starting graceful shutdown");
        },
    }
}
