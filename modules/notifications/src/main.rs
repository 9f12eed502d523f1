use anyhow::Context;
use event_bus::{connect_bus, EventPublisher};
use rate_guard::{
    CooldownGuard, CounterStore, EventLedger, MemoryCounterStore, RateLimiter, RedisCounterStore,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use notifications_rs::{
    config::Config, consumer::start_alert_consumers, routes::router, Notifier,
};

const PRODUCER: &str = "afasa-notifications";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env()
        .map_err(anyhow::Error::msg)
        .context("Failed to load configuration from environment")?;

    let counters: Arc<dyn CounterStore> = match &config.redis_url {
        Some(url) => Arc::new(
            RedisCounterStore::connect(url)
                .await
                .context("Failed to connect to Redis")?,
        ),
        None => {
            tracing::warn!("REDIS_URL not set, alert counters are per-process");
            Arc::new(MemoryCounterStore::new())
        }
    };

    let bus = connect_bus(&config.bus_type, &config.nats_url)
        .await
        .context("Failed to create event bus")?;

    let notifier = Notifier::new(
        CooldownGuard::new(counters.clone()).with_window(config.guard.cooldown),
        RateLimiter::new(counters.clone(), config.guard.limiter.clone()),
        EventLedger::new(counters),
        EventPublisher::new(bus.clone(), PRODUCER),
    );
    start_alert_consumers(bus, &config.consumer_group, notifier)
        .await
        .context("Failed to start alert consumers")?;

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid HOST/PORT")?;
    tracing::info!("Notifications service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind address")?;

    axum::serve(listener, router()).await.context("Server failed")?;
    Ok(())
}
