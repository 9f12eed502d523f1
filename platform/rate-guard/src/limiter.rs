use chrono::{DateTime, NaiveTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::{CounterStore, GuardError, GuardResult};

const DAILY_COUNTER_TTL: Duration = Duration::from_secs(2 * 86_400);

pub fn daily_key(tenant_id: Uuid, now: DateTime<Utc>) -> String {
    format!("afasa:alerts:{}:count:{}", tenant_id, now.format("%Y-%m-%d"))
}

pub fn last_sent_key(tenant_id: Uuid, alert_type: &str) -> String {
    format!("afasa:alerts:{}:last:{}", tenant_id, alert_type)
}

/// Half-open `[start, end)` window of UTC wall-clock time. `start > end`
/// wraps past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuietHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl QuietHours {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Parse `"HH:MM"` bounds.
    pub fn parse(start: &str, end: &str) -> GuardResult<Self> {
        let parse = |s: &str| {
            NaiveTime::parse_from_str(s.trim(), "%H:%M")
                .map_err(|e| GuardError::InvalidConfig(format!("quiet hours '{}': {}", s, e)))
        };
        Ok(Self::new(parse(start)?, parse(end)?))
    }

    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.start <= self.end {
            self.start <= time && time < self.end
        } else {
            time >= self.start || time < self.end
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    QuietHours,
    DailyLimit,
    Cooldown,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::QuietHours => "quiet_hours",
            SkipReason::DailyLimit => "daily_limit",
            SkipReason::Cooldown => "cooldown",
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allow,
    Skip(SkipReason),
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allow)
    }
}

#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    pub max_daily: u32,
    pub type_cooldown: Duration,
    pub quiet_hours: Option<QuietHours>,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_daily: 50,
            type_cooldown: Duration::from_secs(30 * 60),
            quiet_hours: None,
        }
    }
}

/// Tenant-wide limits, checked in order: quiet hours, daily cap, per-type
/// cooldown. The first one that trips is reported.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    config: RateLimiterConfig,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>, config: RateLimiterConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    pub async fn check(
        &self,
        tenant_id: Uuid,
        alert_type: &str,
        now: DateTime<Utc>,
    ) -> GuardResult<RateDecision> {
        if let Some(quiet) = &self.config.quiet_hours {
            if quiet.contains(now.time()) {
                return Ok(RateDecision::Skip(SkipReason::QuietHours));
            }
        }

        let sent_today = self
            .store
            .get(&daily_key(tenant_id, now))
            .await?
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);
        if sent_today >= u64::from(self.config.max_daily) {
            return Ok(RateDecision::Skip(SkipReason::DailyLimit));
        }

        let last = self
            .store
            .get(&last_sent_key(tenant_id, alert_type))
            .await?
            .and_then(|v| DateTime::parse_from_rfc3339(&v).ok())
            .map(|t| t.with_timezone(&Utc));
        if let Some(last) = last {
            let elapsed = now.signed_duration_since(last);
            let window = chrono::Duration::from_std(self.config.type_cooldown)
                .map_err(|e| GuardError::InvalidConfig(e.to_string()))?;
            if elapsed < window {
                return Ok(RateDecision::Skip(SkipReason::Cooldown));
            }
        }

        Ok(RateDecision::Allow)
    }

    /// Count one send against today's cap and start the type cooldown.
    pub async fn record_sent(
        &self,
        tenant_id: Uuid,
        alert_type: &str,
        now: DateTime<Utc>,
    ) -> GuardResult<()> {
        let key = daily_key(tenant_id, now);
        self.store.incr(&key).await?;
        self.store.expire(&key, DAILY_COUNTER_TTL).await?;

        self.store
            .set_ex(
                &last_sent_key(tenant_id, alert_type),
                &now.to_rfc3339(),
                Duration::from_secs(86_400),
            )
            .await
    }
}
