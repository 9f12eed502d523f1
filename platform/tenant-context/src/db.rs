use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

use crate::TenantContextError;

/// Initialize a connection pool to the PostgreSQL database
///
/// `DB_MAX_CONNECTIONS` (default 10), `DB_MIN_CONNECTIONS` (default 0) and
/// `DB_ACQUIRE_TIMEOUT_SECS` (default 3) tune the pool. Tests keep the
/// maximum low to avoid exhausting the shared server.
pub async fn init_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    let max_connections = std::env::var("DB_MAX_CONNECTIONS")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(10);

    let min_connections = std::env::var("DB_MIN_CONNECTIONS")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(0);

    let acquire_timeout_secs = std::env::var("DB_ACQUIRE_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(3);

    PgPoolOptions::new()
        .max_connections(max_connections)
        .min_connections(min_connections)
        .acquire_timeout(Duration::from_secs(acquire_timeout_secs))
        .connect(database_url)
        .await
}

/// Apply the shared schema, including row-level policies.
pub async fn run_migrations(pool: &PgPool) -> Result<(), TenantContextError> {
    sqlx::migrate!("./db/migrations").run(pool).await?;
    Ok(())
}
