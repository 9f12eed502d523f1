//! # Event Consumer
//!
//! Runs one handler per `(subject, consumer group)` on top of an
//! [`event_bus::EventBus`]. For every delivery the runner:
//!
//! 1. decodes the [`EventEnvelope`](event_bus::EventEnvelope) (malformed
//!    payloads are dead-lettered on first sight),
//! 2. calls the handler inside a span tagged with the envelope's
//!    `event_id`, `tenant_id` and `correlation_id`, bounded by the policy's
//!    `ack_wait`,
//! 3. acks on success, naks with backoff on a retriable failure, and
//!    dead-letters on a permanent failure or once `max_deliver` is reached.
//!
//! Handlers see each envelope at least once and must be idempotent.

mod consumer;
mod dlq;
mod handler;

pub use consumer::{process_delivery, start_consumer, ConsumerSpec, Outcome};
pub use dlq::DeadLetter;
pub use handler::{handler_fn, EventHandler, HandlerError, HandlerResult};
