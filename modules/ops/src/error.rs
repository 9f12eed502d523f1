use tenant_context::TenantContextError;
use uuid::Uuid;

use crate::models::RuleStatus;

#[derive(Debug, thiserror::Error)]
pub enum GovernanceError {
    #[error("Proposal not found: {0}")]
    ProposalNotFound(Uuid),

    #[error("Tenant settings not found for tenant {0}")]
    SettingsNotFound(Uuid),

    #[error("Proposal already {0}")]
    AlreadyDecided(RuleStatus),

    #[error("Proposal is {0}; only approved proposals can be activated")]
    NotApproved(RuleStatus),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Tenant context error: {0}")]
    TenantContext(#[from] TenantContextError),

    #[error("Audit error: {0}")]
    Audit(#[from] platform_audit::AuditError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] blob_storage::StorageError),

    #[error("Event bus error: {0}")]
    Bus(#[from] event_bus::BusError),
}

pub type GovernanceResult<T> = Result<T, GovernanceError>;
