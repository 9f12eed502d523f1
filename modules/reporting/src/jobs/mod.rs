//! Report job persistence
//!
//! The job row is the pipeline's checkpoint. [`JobStore::claim`] is the only
//! way into `processing` and is a compare-and-set, so of several workers
//! handed the same request at most one proceeds.

mod memory;
mod pg;

pub use memory::MemoryJobStore;
pub use pg::PgJobStore;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::error::PipelineResult;
use crate::models::{JobStatus, ReportJob};

/// How long a `processing` claim holds before another worker may take over.
pub const DEFAULT_STALE_LEASE: Duration = Duration::minutes(15);

/// Result of trying to move a job into `processing`.
#[derive(Debug, Clone, PartialEq)]
pub enum Claim {
    /// This caller owns the run.
    Claimed(ReportJob),
    Missing,
    AlreadyReady,
    /// Another worker holds a live lease.
    InProgress,
}

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert(&self, job: &ReportJob) -> PipelineResult<()>;

    async fn get(&self, tenant_id: Uuid, id: Uuid) -> PipelineResult<Option<ReportJob>>;

    /// Move `queued`, `failed` or stale `processing` to `processing`.
    async fn claim(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        now: DateTime<Utc>,
        stale_lease: Duration,
    ) -> PipelineResult<Claim>;

    async fn mark_ready(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        artifact_key: &str,
        now: DateTime<Utc>,
    ) -> PipelineResult<()>;

    async fn mark_failed(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        error: &str,
        now: DateTime<Utc>,
    ) -> PipelineResult<()>;

    /// Fail a run that stopped without settling its job.
    ///
    /// Applies only while the job is still `processing` under the claim
    /// stamped `claimed_at`; a newer claim is left alone. Returns whether
    /// the job was changed.
    async fn abandon(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        claimed_at: Option<DateTime<Utc>>,
        error: &str,
        now: DateTime<Utc>,
    ) -> PipelineResult<bool>;
}

/// Whether a job in `status`, claimed at `claimed_at`, may be claimed now.
pub fn claimable(
    status: JobStatus,
    claimed_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    stale_lease: Duration,
) -> bool {
    match status {
        JobStatus::Queued | JobStatus::Failed => true,
        JobStatus::Processing => match claimed_at {
            Some(at) => at < now - stale_lease,
            None => true,
        },
        JobStatus::Ready => false,
    }
}

fn lost_claim(status: JobStatus) -> Claim {
    match status {
        JobStatus::Ready => Claim::AlreadyReady,
        _ => Claim::InProgress,
    }
}
