use blob_storage::StorageError;
use event_bus::BusError;
use tenant_context::TenantContextError;
use uuid::Uuid;

use crate::models::JobStatus;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Report {0} not found")]
    NotFound(Uuid),

    #[error("Report is {0}, not ready")]
    NotReady(JobStatus),

    #[error("{0}")]
    Validation(String),

    #[error("Render failed: {0}")]
    Render(String),

    #[error("{step} timed out after {after:?}")]
    Timeout {
        step: &'static str,
        after: std::time::Duration,
    },

    #[error(transparent)]
    TenantContext(#[from] TenantContextError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Bus error: {0}")]
    Bus(#[from] BusError),
}

pub type PipelineResult<T> = Result<T, PipelineError>;
