//! # Ops
//!
//! Governance for AI-proposed automation rules on a farm tenant:
//!
//! - [`policy_gate`]: decides whether a proposal may skip human approval
//! - [`services::GovernanceService`]: proposal lifecycle, tenant settings
//!   and the audit trail, announcing changes on the bus
//! - [`scheduler`]: daily camera assessment and retention sweeps
//! - [`routes`]: the HTTP surface

pub mod config;
pub mod error;
pub mod events;
pub mod health;
pub mod models;
pub mod policy_gate;
pub mod repos;
pub mod routes;
pub mod scheduler;
pub mod services;

pub use error::{GovernanceError, GovernanceResult};
