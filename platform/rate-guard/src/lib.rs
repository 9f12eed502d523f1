//! # Rate Guard
//!
//! Two independent alert-storm guards over a shared counter store:
//!
//! - [`CooldownGuard`] answers "may this `(tenant, key)` alert again yet?"
//!   with a per-key timestamp that expires on its own after the window.
//! - [`RateLimiter`] applies tenant-wide limits: quiet hours, a daily cap
//!   counted per calendar day, and a per-alert-type cooldown.
//!
//! [`EventLedger`] sits beside them and remembers which inbound event ids
//! already produced an alert.
//!
//! Both take `now` explicitly so callers and tests control the clock.
//! Counters live in Redis in production ([`RedisCounterStore`]) and in a
//! process-local map otherwise ([`MemoryCounterStore`]).

mod config;
mod cooldown;
mod ledger;
mod limiter;
mod store;

pub use config::GuardConfig;
pub use cooldown::{cooldown_key, AlertCheck, CooldownGuard, DEFAULT_COOLDOWN, MIN_CONFIDENCE};
pub use ledger::{handled_key, EventLedger, DEFAULT_LEDGER_TTL};
pub use limiter::{
    daily_key, last_sent_key, QuietHours, RateDecision, RateLimiter, RateLimiterConfig,
    SkipReason,
};
pub use store::{CounterStore, MemoryCounterStore, RedisCounterStore};

#[derive(Debug, thiserror::Error)]
pub enum GuardError {
    #[error("counter store error: {0}")]
    Store(String),

    #[error("invalid guard configuration: {0}")]
    InvalidConfig(String),
}

impl From<redis::RedisError> for GuardError {
    fn from(e: redis::RedisError) -> Self {
        GuardError::Store(e.to_string())
    }
}

pub type GuardResult<T> = Result<T, GuardError>;
