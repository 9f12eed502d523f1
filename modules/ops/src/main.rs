use anyhow::Context;
use blob_storage::{MemoryObjectStore, ObjectStore, S3Config, S3ObjectStore};
use event_bus::{connect_bus, EventPublisher};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use ops_rs::{
    config::Config,
    events::PRODUCER,
    repos::PgGovernanceStore,
    routes::{router, AppState},
    scheduler::start_scheduler,
    services::GovernanceService,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file (if present)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    tracing::info!("Starting ops service...");

    let config = Config::from_env()
        .map_err(anyhow::Error::msg)
        .context("Failed to load configuration from environment")?;

    tracing::info!(
        "Configuration loaded: host={}, port={}, bus_type={}",
        config.host,
        config.port,
        config.bus_type
    );

    tracing::info!("Connecting to database...");
    let pool = tenant_context::init_pool(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    tracing::info!("Running migrations...");
    tenant_context::run_migrations(&pool)
        .await
        .context("Failed to run migrations")?;

    let bus = connect_bus(&config.bus_type, &config.nats_url)
        .await
        .context("Failed to create event bus")?;
    let publisher = EventPublisher::new(bus, PRODUCER);

    if config.scheduler_enabled {
        let objects: Arc<dyn ObjectStore> = match S3Config::from_env() {
            Ok(s3) => Arc::new(S3ObjectStore::connect(s3).await),
            Err(reason) => {
                tracing::warn!(%reason, "Object store not configured; retention will only delete rows");
                Arc::new(MemoryObjectStore::new())
            }
        };
        start_scheduler(pool.clone(), publisher.clone(), objects, config.schedule);
    }

    let store = Arc::new(PgGovernanceStore::new(pool));
    let state = Arc::new(AppState {
        governance: GovernanceService::new(store, publisher),
    });
    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid HOST/PORT")?;
    tracing::info!("Ops service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind address")?;

    axum::serve(listener, app).await.context("Server failed")?;
    Ok(())
}
