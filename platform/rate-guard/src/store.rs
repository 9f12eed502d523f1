use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::{GuardError, GuardResult};

/// Minimal key/value counter surface the guards need.
#[async_trait]
pub trait CounterStore: Send + Sync {
    async fn get(&self, key: &str) -> GuardResult<Option<String>>;

    /// Set `key` to `value`, expiring after `ttl`.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> GuardResult<()>;

    /// Atomically increment, creating the key at 1. Returns the new value.
    async fn incr(&self, key: &str) -> GuardResult<i64>;

    async fn expire(&self, key: &str, ttl: Duration) -> GuardResult<()>;

    async fn delete(&self, key: &str) -> GuardResult<()>;
}

// ---------------------------------------------------------------------------
// Redis
// ---------------------------------------------------------------------------

/// Redis-backed store. `ConnectionManager` reconnects on its own and is
/// cheap to clone per call.
#[derive(Clone)]
pub struct RedisCounterStore {
    conn: ConnectionManager,
}

impl RedisCounterStore {
    pub async fn connect(url: &str) -> GuardResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        tracing::info!("Connected to Redis counter store");
        Ok(Self { conn })
    }
}

fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn get(&self, key: &str) -> GuardResult<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> GuardResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.set_ex(key, value, ttl_secs(ttl)).await?;
        Ok(())
    }

    async fn incr(&self, key: &str) -> GuardResult<i64> {
        let mut conn = self.conn.clone();
        let value: i64 = conn.incr(key, 1).await?;
        Ok(value)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> GuardResult<()> {
        let mut conn = self.conn.clone();
        let secs = i64::try_from(ttl_secs(ttl))
            .map_err(|_| GuardError::InvalidConfig(format!("ttl too large: {:?}", ttl)))?;
        let _: bool = conn.expire(key, secs).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> GuardResult<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.del(key).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Slot {
    value: String,
    expires_at: Option<Instant>,
}

impl Slot {
    fn live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// Process-local store with lazy expiry. Shared between clones.
#[derive(Debug, Clone, Default)]
pub struct MemoryCounterStore {
    slots: Arc<Mutex<HashMap<String, Slot>>>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining time-to-live, `None` if the key is missing or has none.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.lock()
            .get(key)
            .filter(|s| s.live(now))
            .and_then(|s| s.expires_at)
            .map(|at| at.saturating_duration_since(now))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Slot>> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn get(&self, key: &str) -> GuardResult<Option<String>> {
        let now = Instant::now();
        let mut slots = self.lock();
        match slots.get(key) {
            Some(slot) if slot.live(now) => Ok(Some(slot.value.clone())),
            Some(_) => {
                slots.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> GuardResult<()> {
        self.lock().insert(
            key.to_string(),
            Slot {
                value: value.to_string(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn incr(&self, key: &str) -> GuardResult<i64> {
        let now = Instant::now();
        let mut slots = self.lock();
        let current = match slots.get(key) {
            Some(slot) if slot.live(now) => slot
                .value
                .parse::<i64>()
                .map_err(|_| GuardError::Store(format!("value at {} is not an integer", key)))?,
            _ => 0,
        };
        let next = current + 1;
        let expires_at = slots
            .get(key)
            .filter(|s| s.live(now))
            .and_then(|s| s.expires_at);
        slots.insert(
            key.to_string(),
            Slot {
                value: next.to_string(),
                expires_at,
            },
        );
        Ok(next)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> GuardResult<()> {
        if let Some(slot) = self.lock().get_mut(key) {
            slot.expires_at = Some(Instant::now() + ttl);
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> GuardResult<()> {
        self.lock().remove(key);
        Ok(())
    }
}
