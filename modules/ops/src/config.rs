use std::env;

use crate::scheduler::ScheduleConfig;

/// Application configuration parsed from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bus_type: String,
    pub nats_url: String,
    pub host: String,
    pub port: u16,
    pub schedule: ScheduleConfig,
    /// Run the sweeps in this process
    pub scheduler_enabled: bool,
}

fn hour_var(name: &str, default: u32) -> Result<u32, String> {
    match env::var(name) {
        Ok(v) => match v.parse::<u32>() {
            Ok(h) if h < 24 => Ok(h),
            _ => Err(format!("{} must be an hour between 0 and 23", name)),
        },
        Err(_) => Ok(default),
    }
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
            .unwrap_or_else(|_| "8091".to_string())
            .parse()
            .map_err(|_| "PORT must be a valid u16".to_string())?;

        let defaults = ScheduleConfig::default();
        let schedule = ScheduleConfig {
            assessment_hour: hour_var("ASSESSMENT_HOUR", defaults.assessment_hour)?,
            retention_hour: hour_var("RETENTION_HOUR", defaults.retention_hour)?,
        };

        let scheduler_enabled = env::var("SCHEDULER_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        Ok(Config {
            database_url,
            bus_type,
            nats_url,
            host,
            port,
            schedule,
            scheduler_enabled,
        })
    }
}
