use blob_storage::ObjectStore;
use chrono::Utc;
use event_bus::{subjects, EventPublisher};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::error::{PipelineError, PipelineResult};
use crate::jobs::JobStore;
use crate::models::{JobStatus, ReportJob, ReportRequest, ReportRequestedData};

pub const DEFAULT_DOWNLOAD_TTL: Duration = Duration::from_secs(3600);

/// Queues report jobs and hands out downloads.
#[derive(Clone)]
pub struct ReportService {
    jobs: Arc<dyn JobStore>,
    objects: Arc<dyn ObjectStore>,
    publisher: EventPublisher,
    download_ttl: Duration,
}

impl ReportService {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        objects: Arc<dyn ObjectStore>,
        publisher: EventPublisher,
    ) -> Self {
        Self {
            jobs,
            objects,
            publisher,
            download_ttl: DEFAULT_DOWNLOAD_TTL,
        }
    }

    pub fn with_download_ttl(mut self, ttl: Duration) -> Self {
        self.download_ttl = ttl;
        self
    }

    /// Insert a queued job, then publish `report.requested`.
    ///
    /// If the publish fails the job stays queued and the error is returned;
    /// the caller may request again.
    pub async fn request_report(&self, request: ReportRequest) -> PipelineResult<ReportJob> {
        let job = ReportJob::queued(&request, Utc::now()).map_err(PipelineError::Validation)?;
        self.jobs.insert(&job).await?;

        self.publisher
            .publish(
                subjects::REPORT_REQUESTED,
                job.tenant_id,
                ReportRequestedData { report_id: job.id },
                request.correlation_id,
            )
            .await?;

        tracing::info!(
            tenant_id = %job.tenant_id,
            report_id = %job.id,
            kind = ?job.kind,
            format = ?job.format,
            "Report requested"
        );
        Ok(job)
    }

    pub async fn get_report(&self, tenant_id: Uuid, id: Uuid) -> PipelineResult<ReportJob> {
        self.jobs
            .get(tenant_id, id)
            .await?
            .ok_or(PipelineError::NotFound(id))
    }

    /// Time-limited URL for a ready report.
    pub async fn download_url(&self, tenant_id: Uuid, id: Uuid) -> PipelineResult<String> {
        let job = self.get_report(tenant_id, id).await?;
        match (job.status, job.artifact_key) {
            (JobStatus::Ready, Some(key)) => Ok(self.objects.presign(&key, self.download_ttl).await?),
            (status, _) => Err(PipelineError::NotReady(status)),
        }
    }
}
