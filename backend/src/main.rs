use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use trip_routing::{
    cache::{DurableTier, FileStore, MemoryStore, MemoryTier, TieredCache},
    config::{AppConfig, RoutingConfig},
    create_router,
    database::{DatabaseError, PgStore},
    AppState,
};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Route computation and multi-source content resolution service"
)]
struct Args {
    /// Address to listen on (overrides BIND_ADDR)
    #[arg(long)]
    bind: Option<String>,

    /// JSON file with routing tunables (overrides ROUTING_CONFIG)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trip_routing=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let mut config = AppConfig::from_env()?;
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if let Some(path) = args.config {
        config.routing = RoutingConfig::from_file(&path)?;
        tracing::info!("loaded routing config from {}", path.display());
    }

    let cache = build_cache(&config).await?;
    let state = AppState::from_config(&config, cache)?;
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("starting trip-routing on http://{}", config.bind_addr);
    tracing::info!("  POST /api/route - fastest, scenic or longest route with GPX");
    tracing::info!("  GET /api/geocode?q= - all matches for a place name");
    tracing::info!("  GET /api/content?q=&category=&policy= - destination content");
    axum::serve(listener, app).await?;
    Ok(())
}

/// Durable tier: Postgres when DATABASE_URL is set, else files under
/// CACHE_DIR, else process memory.
async fn build_cache(config: &AppConfig) -> Result<TieredCache, DatabaseError> {
    let fast = Arc::new(MemoryTier::new(config.cache_capacity));
    let durable: Arc<dyn DurableTier> = match (&config.database_url, &config.cache_dir) {
        (Some(url), _) => {
            let store = PgStore::connect(url).await?;
            store.migrate().await?;
            let purged = store.purge_expired().await?;
            tracing::info!(purged, "PostgreSQL cache tier ready");
            Arc::new(store)
        }
        (None, Some(dir)) => {
            tracing::info!("file cache tier in {}", dir.display());
            Arc::new(FileStore::new(dir.clone()))
        }
        (None, None) => {
            tracing::warn!("no DATABASE_URL or CACHE_DIR, cache is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };
    Ok(TieredCache::new(fast, durable))
}
