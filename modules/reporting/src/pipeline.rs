//! Idempotent report pipeline
//!
//! One run per `report.requested` delivery:
//!
//! 1. claim the job (compare-and-set into `processing`, committed before any
//!    work); a missing job, a `ready` job or a live lease ends the run
//! 2. gather inputs, render off the async workers, upload to the
//!    deterministic artifact key
//! 3. mark `ready` and publish `report.ready` on the request's correlation id
//!
//! A failure in 2 or 3 marks the job `failed` and the run still completes,
//! so the delivery is acked. Re-requesting the same report re-runs it and
//! overwrites the same key.
//!
//! Every step after the claim is bounded by the step timeout. A run that is
//! dropped mid-flight (its consumer hit the ack deadline) fails its own
//! claim on the way out instead of leaving the job in `processing` until
//! the lease goes stale.

use blob_storage::ObjectStore;
use chrono::{DateTime, Duration, Utc};
use event_bus::{subjects, EventPublisher};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use uuid::Uuid;

use crate::error::{PipelineError, PipelineResult};
use crate::inputs::ReportInputs;
use crate::jobs::{Claim, JobStore, DEFAULT_STALE_LEASE};
use crate::models::{ReportJob, ReportReadyData};
use crate::render;

/// Upper bound on each I/O step of a run.
pub const DEFAULT_STEP_TIMEOUT: StdDuration = StdDuration::from_secs(60);

/// Bounded steps in one run: claim, gather, render, put, mark ready,
/// publish, and marking a failure.
const RUN_STEPS: u32 = 7;

/// Recorded on a job whose run was dropped before it settled.
pub const CANCELLED_ERROR: &str = "report run cancelled";

/// How a run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Ready { artifact_key: String },
    Failed { error: String },
    /// Nothing to do: the job is missing, already ready, or leased elsewhere.
    Skipped(Claim),
}

#[derive(Clone)]
pub struct ReportRunner {
    jobs: Arc<dyn JobStore>,
    inputs: Arc<dyn ReportInputs>,
    objects: Arc<dyn ObjectStore>,
    publisher: EventPublisher,
    stale_lease: Duration,
    step_timeout: StdDuration,
}

impl ReportRunner {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        inputs: Arc<dyn ReportInputs>,
        objects: Arc<dyn ObjectStore>,
        publisher: EventPublisher,
    ) -> Self {
        Self {
            jobs,
            inputs,
            objects,
            publisher,
            stale_lease: DEFAULT_STALE_LEASE,
            step_timeout: DEFAULT_STEP_TIMEOUT,
        }
    }

    pub fn with_stale_lease(mut self, stale_lease: Duration) -> Self {
        self.stale_lease = stale_lease;
        self
    }

    pub fn with_step_timeout(mut self, step_timeout: StdDuration) -> Self {
        self.step_timeout = step_timeout;
        self
    }

    pub fn stale_lease(&self) -> Duration {
        self.stale_lease
    }

    /// Longest a run can take when every step uses its full timeout.
    pub fn run_deadline(&self) -> StdDuration {
        self.step_timeout * RUN_STEPS
    }

    /// Drive one report to `ready` or `failed`.
    ///
    /// Errors are returned only when the claim itself could not be made;
    /// nothing has happened yet, so the delivery can safely be retried.
    pub async fn run(
        &self,
        tenant_id: Uuid,
        report_id: Uuid,
        correlation_id: Uuid,
    ) -> PipelineResult<RunOutcome> {
        let claim = self.bounded(
            "claim",
            self.jobs.claim(tenant_id, report_id, Utc::now(), self.stale_lease),
        );
        let job = match claim.await? {
            Claim::Claimed(job) => job,
            Claim::Missing => {
                tracing::warn!(report_id = %report_id, "Report not found, dropping request");
                return Ok(RunOutcome::Skipped(Claim::Missing));
            }
            other => {
                tracing::debug!(report_id = %report_id, claim = ?other, "Report not claimable, skipping");
                return Ok(RunOutcome::Skipped(other));
            }
        };

        tracing::info!(
            report_id = %job.id,
            kind = ?job.kind,
            format = ?job.format,
            "Report claimed"
        );

        let mut guard = ClaimGuard::new(self.jobs.clone(), &job);

        match self.produce(&job, correlation_id).await {
            Ok(artifact_key) => {
                guard.settle();
                tracing::info!(report_id = %job.id, artifact_key = %artifact_key, "Report ready");
                Ok(RunOutcome::Ready { artifact_key })
            }
            Err(e) => {
                let error = e.to_string();
                tracing::error!(report_id = %job.id, error = %error, "Report generation failed");
                guard.error = error.clone();
                let marked = self.bounded(
                    "mark failed",
                    self.jobs.mark_failed(tenant_id, job.id, &error, Utc::now()),
                );
                match marked.await {
                    Ok(()) => guard.settle(),
                    // The guard retries with this error when it drops.
                    Err(mark) => {
                        tracing::error!(report_id = %job.id, error = %mark, "Failed to mark report failed")
                    }
                }
                Ok(RunOutcome::Failed { error })
            }
        }
    }

    async fn produce(&self, job: &ReportJob, correlation_id: Uuid) -> PipelineResult<String> {
        let data = self
            .bounded(
                "gather inputs",
                self.inputs.gather(job.tenant_id, job.range_from, job.range_to),
            )
            .await?;
        let bytes = self
            .bounded("render", render::render(job.clone(), data))
            .await?;

        let artifact_key = job.artifact_key();
        self.bounded(
            "upload",
            async {
                self.objects
                    .put(&artifact_key, bytes, job.format.content_type())
                    .await?;
                Ok::<_, PipelineError>(())
            },
        )
        .await?;

        self.bounded(
            "mark ready",
            self.jobs.mark_ready(job.tenant_id, job.id, &artifact_key, Utc::now()),
        )
        .await?;

        let ready = ReportReadyData {
            report_id: job.id,
            artifact_key: artifact_key.clone(),
            format: job.format,
        };
        self.bounded("publish", async {
            self.publisher
                .publish(subjects::REPORT_READY, job.tenant_id, ready, Some(correlation_id))
                .await?;
            Ok::<_, PipelineError>(())
        })
        .await?;

        Ok(artifact_key)
    }

    async fn bounded<T>(
        &self,
        step: &'static str,
        fut: impl Future<Output = PipelineResult<T>>,
    ) -> PipelineResult<T> {
        match tokio::time::timeout(self.step_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(PipelineError::Timeout {
                step,
                after: self.step_timeout,
            }),
        }
    }
}

/// Fails the claimed job if the run is dropped before it settles.
struct ClaimGuard {
    jobs: Arc<dyn JobStore>,
    tenant_id: Uuid,
    report_id: Uuid,
    claimed_at: Option<DateTime<Utc>>,
    error: String,
    armed: bool,
}

impl ClaimGuard {
    fn new(jobs: Arc<dyn JobStore>, job: &ReportJob) -> Self {
        Self {
            jobs,
            tenant_id: job.tenant_id,
            report_id: job.id,
            claimed_at: job.claimed_at,
            error: CANCELLED_ERROR.to_string(),
            armed: true,
        }
    }

    fn settle(&mut self) {
        self.armed = false;
    }
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(report_id = %self.report_id, "No runtime to release report claim");
            return;
        };

        let jobs = self.jobs.clone();
        let (tenant_id, report_id, claimed_at) = (self.tenant_id, self.report_id, self.claimed_at);
        let error = std::mem::take(&mut self.error);
        handle.spawn(async move {
            match jobs
                .abandon(tenant_id, report_id, claimed_at, &error, Utc::now())
                .await
            {
                Ok(true) => {
                    tracing::warn!(report_id = %report_id, error = %error, "Unsettled report run marked failed")
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(report_id = %report_id, error = %e, "Failed to release report claim")
                }
            }
        });
    }
}
