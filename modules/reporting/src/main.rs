use anyhow::Context;
use blob_storage::{ObjectStore, S3Config, S3ObjectStore};
use event_bus::{connect_bus, EventPublisher};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use reporting::{
    config::Config,
    consumer::start_report_consumer,
    inputs::PgReportInputs,
    jobs::PgJobStore,
    pipeline::ReportRunner,
    routes::{router, AppState},
    service::ReportService,
};

const PRODUCER: &str = "afasa-reporting";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file (if present)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    tracing::info!("Starting reporting service...");

    let config = Config::from_env()
        .map_err(anyhow::Error::msg)
        .context("Failed to load configuration from environment")?;

    tracing::info!(
        "Configuration loaded: host={}, port={}, bus_type={}, group={}",
        config.host,
        config.port,
        config.bus_type,
        config.consumer_group
    );

    let pool = tenant_context::init_pool(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    tenant_context::run_migrations(&pool)
        .await
        .context("Failed to run migrations")?;

    let s3 = S3Config::from_env()
        .map_err(anyhow::Error::msg)
        .context("Object store configuration")?;
    let objects: Arc<dyn ObjectStore> = Arc::new(S3ObjectStore::connect(s3).await);

    let bus = connect_bus(&config.bus_type, &config.nats_url)
        .await
        .context("Failed to create event bus")?;
    let publisher = EventPublisher::new(bus.clone(), PRODUCER);

    let jobs = Arc::new(PgJobStore::new(pool.clone()));

    let runner = ReportRunner::new(
        jobs.clone(),
        Arc::new(PgReportInputs::new(pool)),
        objects.clone(),
        publisher.clone(),
    )
    .with_stale_lease(chrono::Duration::minutes(config.stale_lease_mins))
    .with_step_timeout(Duration::from_secs(config.step_timeout_secs));

    start_report_consumer(bus, &config.consumer_group, runner)
        .await
        .context("Failed to start report consumer")?;

    let reports = ReportService::new(jobs, objects, publisher)
        .with_download_ttl(Duration::from_secs(config.download_ttl_secs));
    let app = router(Arc::new(AppState { reports }));

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid HOST/PORT")?;
    tracing::info!("Reporting service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind address")?;

    axum::serve(listener, app).await.context("Server failed")?;
    Ok(())
}
