//! # Notifications
//!
//! Consumes `vision.assessment.created` and `ops.rule.proposed` and
//! publishes chat alerts on `notify.telegram.outbound`. Assessment alerts
//! are gated by the `rate-guard` cooldown and rate limiter.

pub mod alerts;
pub mod config;
pub mod consumer;
pub mod error;
pub mod models;
pub mod routes;

pub use alerts::{AlertOutcome, AlertSource, Notifier};
pub use error::{NotifyError, NotifyResult};
