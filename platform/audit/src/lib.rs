//! # Audit Trail
//!
//! Append-only record of every governance decision and settings mutation.
//! There is no update or delete path here, and the `audit_log` table rejects
//! both with a trigger.
//!
//! Entries are written on the caller's connection so they commit or roll
//! back together with the mutation they describe.

mod entry;
mod memory;
mod writer;

pub use entry::{actions, targets, ActorType, AuditEntry, AuditFilter};
pub use memory::MemoryAuditLog;
pub use writer::{append, list};

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
