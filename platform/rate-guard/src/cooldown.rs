use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::{CounterStore, GuardResult};

pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(3600);

/// Detections below this confidence never alert.
pub const MIN_CONFIDENCE: f64 = 0.5;

pub fn cooldown_key(tenant_id: Uuid, key: &str) -> String {
    format!("cooldown:{}:{}", tenant_id, key)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AlertCheck {
    pub allow: bool,
    pub cooldown_remaining_secs: i64,
}

impl AlertCheck {
    fn allow() -> Self {
        Self {
            allow: true,
            cooldown_remaining_secs: 0,
        }
    }

    fn deny(remaining: i64) -> Self {
        Self {
            allow: false,
            cooldown_remaining_secs: remaining,
        }
    }
}

/// Per-`(tenant, key)` cooldown. The stored value is the unix timestamp of
/// the last send and expires with the window, so nothing needs sweeping.
#[derive(Clone)]
pub struct CooldownGuard {
    store: Arc<dyn CounterStore>,
    window: Duration,
    min_confidence: f64,
}

impl CooldownGuard {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self {
            store,
            window: DEFAULT_COOLDOWN,
            min_confidence: MIN_CONFIDENCE,
        }
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn with_min_confidence(mut self, min_confidence: f64) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub async fn should_alert(
        &self,
        tenant_id: Uuid,
        key: &str,
        confidence: f64,
        now: DateTime<Utc>,
    ) -> GuardResult<AlertCheck> {
        if confidence < self.min_confidence {
            return Ok(AlertCheck::deny(0));
        }

        let last = self.store.get(&cooldown_key(tenant_id, key)).await?;
        let Some(last) = last.and_then(|v| v.parse::<i64>().ok()) else {
            return Ok(AlertCheck::allow());
        };

        let window = i64::try_from(self.window.as_secs()).unwrap_or(i64::MAX);
        let elapsed = now.timestamp() - last;
        let remaining = window.saturating_sub(elapsed);
        if remaining <= 0 {
            Ok(AlertCheck::allow())
        } else {
            Ok(AlertCheck::deny(remaining))
        }
    }

    pub async fn record_sent(&self, tenant_id: Uuid, key: &str, now: DateTime<Utc>) -> GuardResult<()> {
        self.store
            .set_ex(
                &cooldown_key(tenant_id, key),
                &now.timestamp().to_string(),
                self.window,
            )
            .await
    }

    /// Manual reset.
    pub async fn clear_cooldown(&self, tenant_id: Uuid, key: &str) -> GuardResult<()> {
        self.store.delete(&cooldown_key(tenant_id, key)).await
    }
}
