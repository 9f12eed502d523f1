use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use super::{claimable, lost_claim, Claim, JobStore};
use crate::error::{PipelineError, PipelineResult};
use crate::models::{JobStatus, ReportJob};

/// In-process job table for tests and database-less runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryJobStore {
    jobs: Arc<Mutex<HashMap<Uuid, ReportJob>>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite a job row, e.g. to simulate a crashed worker.
    pub fn put(&self, job: ReportJob) {
        self.lock().insert(job.id, job);
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, ReportJob>> {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, job: &ReportJob) -> PipelineResult<()> {
        let mut jobs = self.lock();
        if jobs.contains_key(&job.id) {
            return Err(PipelineError::Validation(format!("Report {} already exists", job.id)));
        }
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn get(&self, tenant_id: Uuid, id: Uuid) -> PipelineResult<Option<ReportJob>> {
        Ok(self
            .lock()
            .get(&id)
            .filter(|j| j.tenant_id == tenant_id)
            .cloned())
    }

    async fn claim(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        now: DateTime<Utc>,
        stale_lease: Duration,
    ) -> PipelineResult<Claim> {
        let mut jobs = self.lock();
        let Some(job) = jobs.get_mut(&id).filter(|j| j.tenant_id == tenant_id) else {
            return Ok(Claim::Missing);
        };

        if !claimable(job.status, job.claimed_at, now, stale_lease) {
            return Ok(lost_claim(job.status));
        }

        job.status = JobStatus::Processing;
        job.claimed_at = Some(now);
        job.error = None;
        Ok(Claim::Claimed(job.clone()))
    }

    async fn mark_ready(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        artifact_key: &str,
        now: DateTime<Utc>,
    ) -> PipelineResult<()> {
        let mut jobs = self.lock();
        let job = jobs
            .get_mut(&id)
            .filter(|j| j.tenant_id == tenant_id)
            .ok_or(PipelineError::NotFound(id))?;
        job.status = JobStatus::Ready;
        job.artifact_key = Some(artifact_key.to_string());
        job.error = None;
        job.completed_at = Some(now);
        Ok(())
    }

    async fn mark_failed(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        error: &str,
        now: DateTime<Utc>,
    ) -> PipelineResult<()> {
        let mut jobs = self.lock();
        let job = jobs
            .get_mut(&id)
            .filter(|j| j.tenant_id == tenant_id)
            .ok_or(PipelineError::NotFound(id))?;
        job.status = JobStatus::Failed;
        job.error = Some(error.to_string());
        job.completed_at = Some(now);
        Ok(())
    }

    async fn abandon(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        claimed_at: Option<DateTime<Utc>>,
        error: &str,
        now: DateTime<Utc>,
    ) -> PipelineResult<bool> {
        let mut jobs = self.lock();
        let Some(job) = jobs.get_mut(&id).filter(|j| j.tenant_id == tenant_id) else {
            return Ok(false);
        };
        if job.status != JobStatus::Processing || job.claimed_at != claimed_at {
            return Ok(false);
        }
        job.status = JobStatus::Failed;
        job.error = Some(error.to_string());
        job.completed_at = Some(now);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::DEFAULT_STALE_LEASE;
    use crate::models::{ReportFormat, ReportKind, ReportRequest};

    fn queued(tenant_id: Uuid) -> ReportJob {
        let request = ReportRequest {
            tenant_id,
            kind: ReportKind::Daily,
            format: ReportFormat::Csv,
            range_from: None,
            range_to: None,
            correlation_id: None,
        };
        ReportJob::queued(&request, Utc::now()).unwrap()
    }

    #[tokio::test]
    async fn test_second_claim_loses() {
        let store = MemoryJobStore::new();
        let job = queued(Uuid::new_v4());
        store.insert(&job).await.unwrap();
        let now = Utc::now();

        let first = store
            .claim(job.tenant_id, job.id, now, DEFAULT_STALE_LEASE)
            .await
            .unwrap();
        assert!(matches!(first, Claim::Claimed(ref j) if j.status == JobStatus::Processing));

        let second = store
            .claim(job.tenant_id, job.id, now, DEFAULT_STALE_LEASE)
            .await
            .unwrap();
        assert_eq!(second, Claim::InProgress);
    }

    #[tokio::test]
    async fn test_claim_is_tenant_scoped() {
        let store = MemoryJobStore::new();
        let job = queued(Uuid::new_v4());
        store.insert(&job).await.unwrap();

        let claim = store
            .claim(Uuid::new_v4(), job.id, Utc::now(), Duration::minutes(15))
            .await
            .unwrap();
        assert_eq!(claim, Claim::Missing);
    }

    #[tokio::test]
    async fn test_abandon_fails_only_its_own_claim() {
        let store = MemoryJobStore::new();
        let job = queued(Uuid::new_v4());
        store.insert(&job).await.unwrap();
        let first_at = Utc::now() - Duration::minutes(20);

        let Claim::Claimed(first) = store
            .claim(job.tenant_id, job.id, first_at, DEFAULT_STALE_LEASE)
            .await
            .unwrap()
        else {
            panic!("first claim should succeed");
        };
        // The lease went stale and another worker took over.
        let now = Utc::now();
        let Claim::Claimed(second) = store
            .claim(job.tenant_id, job.id, now, DEFAULT_STALE_LEASE)
            .await
            .unwrap()
        else {
            panic!("stale lease should be reclaimable");
        };

        let changed = store
            .abandon(job.tenant_id, job.id, first.claimed_at, "report run cancelled", now)
            .await
            .unwrap();
        assert!(!changed);
        let current = store.get(job.tenant_id, job.id).await.unwrap().unwrap();
        assert_eq!(current.status, JobStatus::Processing);

        let changed = store
            .abandon(job.tenant_id, job.id, second.claimed_at, "report run cancelled", now)
            .await
            .unwrap();
        assert!(changed);
        let current = store.get(job.tenant_id, job.id).await.unwrap().unwrap();
        assert_eq!(current.status, JobStatus::Failed);
        assert_eq!(current.error.as_deref(), Some("report run cancelled"));
    }
}
