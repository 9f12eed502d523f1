use event_bus::subjects::DEFAULT_CONSUMER_GROUP;
use rate_guard::GuardConfig;
use std::env;

/// Application configuration parsed from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub bus_type: String,
    pub nats_url: String,
    /// Counters are process-local when unset
    pub redis_url: Option<String>,
    pub host: String,
    pub port: u16,
    pub consumer_group: String,
    pub guard: GuardConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let bus_type = env::var("BUS_TYPE")
            .unwrap_or_else(|_| "inmemory".to_string());

        let nats_url = env::var("NATS_URL")
            .unwrap_or_else(|_| "nats://localhost:4222".to_string());

        let redis_url = env::var("REDIS_URL").ok().filter(|v| !v.is_empty());

        let host = env::var("HOST")
            .unwrap_or_else(|_| "0.0.0.0".to_string());

        let port: u16 = env::var("PORT")
            .unwrap_or_else(|_| "8089".to_string())
            .parse()
            .map_err(|_| "PORT must be a valid u16".to_string())?;

        let consumer_group = env::var("CONSUMER_GROUP")
            .unwrap_or_else(|_| DEFAULT_CONSUMER_GROUP.to_string());

        let guard = GuardConfig::from_env()?;

        Ok(Config {
            bus_type,
            nats_url,
            redis_url,
            host,
            port,
            consumer_group,
            guard,
        })
    }
}
