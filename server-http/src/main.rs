use roster::persistence::{SledEventLog, SledRegistry};
use roster::ports::KeyValueStore;
use server_http::{AppState, build_router};
use shared::config::Config;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use storage_engine::MemoryStore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const JANITOR_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env first so RUST_LOG from the file reaches the filter
    let dotenv = dotenvy::dotenv();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting Roster HTTP Server...");
    match dotenv {
        Ok(_) => info!("Loaded environment variables from .env file"),
        Err(_) => info!("No .env file found, using system environment variables"),
    }

    let config = Config::from_env();
    let data_dir = Path::new(&config.data_dir);
    let registry = Arc::new(SledRegistry::new(data_dir.join("registrations.sled"))?);
    let event_log = Arc::new(SledEventLog::new(data_dir.join("events.sled"))?);
    info!("Opened registry and event log under {}", config.data_dir);

    let shutdown = CancellationToken::new();
    let mut tasks: Vec<JoinHandle<()>> = Vec::new();

    let store: Arc<dyn KeyValueStore> = match shared_store(&config).await {
        Some(store) => store,
        None => {
            let store = MemoryStore::new();
            tasks.push(spawn_janitor(store.clone(), shutdown.clone()));
            Arc::new(store)
        }
    };

    let state = AppState::new(
        store,
        registry,
        event_log,
        config.cache.clone(),
        &config.consumer_group,
    );

    if config.run_consumer {
        let consumer = state.consumer.clone();
        let token = shutdown.clone();
        tasks.push(tokio::spawn(async move { consumer.run(token).await }));
    } else {
        info!("Invalidation consumer disabled for this instance");
    }

    let reconciler = state.reconciler.clone();
    let token = shutdown.clone();
    tasks.push(tokio::spawn(async move { reconciler.run(token).await }));

    let router = build_router(state.clone(), &config.allowed_origins);
    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    info!("HTTP Server listening on http://{}", config.bind_addr());

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    shutdown.cancel();
    for task in tasks {
        if let Err(e) = task.await {
            warn!("Background task ended abnormally: {}", e);
        }
    }
    state.producer.shutdown().await?;

    info!("Server shutdown complete");
    Ok(())
}

#[cfg(feature = "redis")]
async fn shared_store(config: &Config) -> Option<Arc<dyn KeyValueStore>> {
    let url = config.redis_url.as_ref()?;
    info!("Connecting to Redis");
    match storage_engine::RedisStore::connect(url, config.cache.store_timeout).await {
        Ok(store) => Some(Arc::new(store)),
        Err(e) => {
            warn!("{}. Falling back to in-process store.", e);
            None
        }
    }
}

#[cfg(not(feature = "redis"))]
async fn shared_store(config: &Config) -> Option<Arc<dyn KeyValueStore>> {
    if config.redis_url.is_some() {
        warn!("ROSTER_REDIS_URL is set but this build has no redis support, using local store");
    }
    None
}

fn spawn_janitor(store: MemoryStore, shutdown: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(JANITOR_INTERVAL);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    store.purge_expired();
                }
            }
        }
    })
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install terminate handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }

    info!("Shutting down gracefully...");
}
