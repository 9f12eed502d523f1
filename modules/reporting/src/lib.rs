//! # Reporting
//!
//! Farm health reports produced by an idempotent pipeline:
//!
//! - [`service::ReportService`] queues a job and publishes `report.requested`
//! - [`consumer`] runs [`pipeline::ReportRunner`] for each request
//! - [`jobs::JobStore`] holds the job row the pipeline checkpoints on
//!
//! The runner is safe under at-least-once delivery: a duplicate request for
//! a ready report is a no-op, and one for a failed report re-runs it into
//! the same artifact key.

pub mod config;
pub mod consumer;
pub mod error;
pub mod inputs;
pub mod jobs;
pub mod models;
pub mod pipeline;
pub mod render;
pub mod routes;
pub mod service;

pub use error::{PipelineError, PipelineResult};
