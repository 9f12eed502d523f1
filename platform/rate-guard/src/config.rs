use std::time::Duration;

use crate::{QuietHours, RateLimiterConfig, DEFAULT_COOLDOWN};

/// Guard settings read from the environment.
///
/// - `ALERT_COOLDOWN_SECS`: per-key cooldown window (default 3600)
/// - `ALERT_MAX_DAILY`: alerts per tenant per day (default 50)
/// - `ALERT_TYPE_COOLDOWN_SECS`: per-type cooldown (default 1800)
/// - `ALERT_QUIET_START` / `ALERT_QUIET_END`: `HH:MM` UTC, both or neither
#[derive(Debug, Clone)]
pub struct GuardConfig {
    pub cooldown: Duration,
    pub limiter: RateLimiterConfig,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            cooldown: DEFAULT_COOLDOWN,
            limiter: RateLimiterConfig::default(),
        }
    }
}

impl GuardConfig {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let defaults = Self::default();

        let cooldown = match lookup("ALERT_COOLDOWN_SECS") {
            Some(v) => Duration::from_secs(
                v.parse()
                    .map_err(|_| format!("ALERT_COOLDOWN_SECS must be a number, got '{}'", v))?,
            ),
            None => defaults.cooldown,
        };

        let max_daily = match lookup("ALERT_MAX_DAILY") {
            Some(v) => v
                .parse()
                .map_err(|_| format!("ALERT_MAX_DAILY must be a number, got '{}'", v))?,
            None => defaults.limiter.max_daily,
        };

        let type_cooldown = match lookup("ALERT_TYPE_COOLDOWN_SECS") {
            Some(v) => Duration::from_secs(
                v.parse()
                    .map_err(|_| format!("ALERT_TYPE_COOLDOWN_SECS must be a number, got '{}'", v))?,
            ),
            None => defaults.limiter.type_cooldown,
        };

        let quiet_hours = match (lookup("ALERT_QUIET_START"), lookup("ALERT_QUIET_END")) {
            (Some(start), Some(end)) => {
                Some(QuietHours::parse(&start, &end).map_err(|e| e.to_string())?)
            }
            (None, None) => None,
            _ => {
                return Err("ALERT_QUIET_START and ALERT_QUIET_END must be set together".to_string())
            }
        };

        Ok(Self {
            cooldown,
            limiter: RateLimiterConfig {
                max_daily,
                type_cooldown,
                quiet_hours,
            },
        })
    }
}
