use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::{CounterStore, GuardResult};

/// How long a handled event id is remembered. Longer than any broker
/// redelivery schedule.
pub const DEFAULT_LEDGER_TTL: Duration = Duration::from_secs(24 * 3600);

pub fn handled_key(tenant_id: Uuid, event_id: Uuid) -> String {
    format!("handled:{}:{}", tenant_id, event_id)
}

/// Inbound events that already produced their side effect, so a redelivery
/// of the same event id does not produce it twice.
#[derive(Clone)]
pub struct EventLedger {
    store: Arc<dyn CounterStore>,
    ttl: Duration,
}

impl EventLedger {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self {
            store,
            ttl: DEFAULT_LEDGER_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub async fn already_handled(&self, tenant_id: Uuid, event_id: Uuid) -> GuardResult<bool> {
        Ok(self
            .store
            .get(&handled_key(tenant_id, event_id))
            .await?
            .is_some())
    }

    pub async fn record_handled(&self, tenant_id: Uuid, event_id: Uuid) -> GuardResult<()> {
        self.store
            .set_ex(&handled_key(tenant_id, event_id), "1", self.ttl)
            .await
    }
}
