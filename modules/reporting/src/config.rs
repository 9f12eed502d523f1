use event_bus::subjects::DEFAULT_CONSUMER_GROUP;
use std::env;

/// Application configuration parsed from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bus_type: String,
    pub nats_url: String,
    pub host: String,
    pub port: u16,
    pub consumer_group: String,
    /// Minutes before a `processing` claim may be taken over
    pub stale_lease_mins: i64,
    /// Bound on each gather, render, upload and bookkeeping step
    pub step_timeout_secs: u64,
    pub download_ttl_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| "DATABASE_URL must be set".to_string())?;

        let bus_type = env::var("BUS_TYPE")
            .unwrap_or_else(|_| "inmemory".to_string());

        let nats_url = env::var("NATS_URL")
            .unwrap_or_else(|_| "nats://localhost:4222".to_string());

        let host = env::var("HOST")
            .unwrap_or_else(|_| "0.0.0.0".to_string());

        let port: u16 = env::var("PORT")
            .unwrap_or_else(|_| "8092".to_string())
            .parse()
            .map_err(|_| "PORT must be a valid u16".to_string())?;

        let consumer_group = env::var("CONSUMER_GROUP")
            .unwrap_or_else(|_| DEFAULT_CONSUMER_GROUP.to_string());

        let stale_lease_mins: i64 = env::var("REPORT_STALE_LEASE_MINS")
            .unwrap_or_else(|_| "15".to_string())
            .parse()
            .map_err(|_| "REPORT_STALE_LEASE_MINS must be a whole number of minutes".to_string())?;

        let step_timeout_secs: u64 = env::var("REPORT_STEP_TIMEOUT_SECS")
            .unwrap_or_else(|_| "60".to_string())
            .parse()
            .map_err(|_| "REPORT_STEP_TIMEOUT_SECS must be a valid u64".to_string())?;

        let download_ttl_secs: u64 = env::var("REPORT_DOWNLOAD_TTL_SECS")
            .unwrap_or_else(|_| "3600".to_string())
            .parse()
            .map_err(|_| "REPORT_DOWNLOAD_TTL_SECS must be a valid u64".to_string())?;

        Ok(Config {
            database_url,
            bus_type,
            nats_url,
            host,
            port,
            consumer_group,
            stale_lease_mins,
            step_timeout_secs,
            download_ttl_secs,
        })
    }
}
