//! Report pipeline under duplicate, failed and concurrent deliveries.

use blob_storage::{MemoryObjectStore, ObjectStore};
use chrono::{Duration, Utc};
use event_bus::{BusMessage, EventBus, EventEnvelope, EventPublisher, InMemoryBus};
use futures::stream::BoxStream;
use futures::StreamExt;
use reporting::consumer::start_report_consumer;
use reporting::inputs::{MemoryReportInputs, ReportData, ReportSummary};
use reporting::jobs::{Claim, JobStore, MemoryJobStore};
use reporting::models::{JobStatus, ReportFormat, ReportKind, ReportReadyData, ReportRequest};
use reporting::pipeline::{ReportRunner, RunOutcome, CANCELLED_ERROR};
use reporting::service::ReportService;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use uuid::Uuid;

struct Harness {
    bus: Arc<InMemoryBus>,
    jobs: MemoryJobStore,
    objects: MemoryObjectStore,
    runner: ReportRunner,
    service: ReportService,
}

fn harness() -> Harness {
    let bus = Arc::new(InMemoryBus::new());
    let jobs = MemoryJobStore::new();
    let objects = MemoryObjectStore::new();
    let inputs = MemoryReportInputs::new();
    let publisher = EventPublisher::new(bus.clone(), "afasa-reporting");

    let runner = ReportRunner::new(
        Arc::new(jobs.clone()),
        Arc::new(inputs),
        Arc::new(objects.clone()),
        publisher.clone(),
    );
    let service = ReportService::new(Arc::new(jobs.clone()), Arc::new(objects.clone()), publisher);

    Harness {
        bus,
        jobs,
        objects,
        runner,
        service,
    }
}

/// Runner over `jobs` and `objects` whose input queries take `delay`.
fn slow_runner(
    bus: Arc<InMemoryBus>,
    jobs: &MemoryJobStore,
    objects: &MemoryObjectStore,
    delay: StdDuration,
) -> ReportRunner {
    ReportRunner::new(
        Arc::new(jobs.clone()),
        Arc::new(MemoryReportInputs::new().with_delay(delay)),
        Arc::new(objects.clone()),
        EventPublisher::new(bus, "afasa-reporting"),
    )
}

async fn wait_for_status(jobs: &MemoryJobStore, tenant: Uuid, id: Uuid, status: JobStatus) -> bool {
    for _ in 0..50 {
        let job = jobs.get(tenant, id).await.unwrap().unwrap();
        if job.status == status {
            return true;
        }
        tokio::time::sleep(StdDuration::from_millis(10)).await;
    }
    false
}

fn request(tenant_id: Uuid, format: ReportFormat) -> ReportRequest {
    ReportRequest {
        tenant_id,
        kind: ReportKind::Weekly,
        format,
        range_from: None,
        range_to: None,
        correlation_id: Some(Uuid::new_v4()),
    }
}

async fn next_ready(stream: &mut BoxStream<'static, BusMessage>) -> Option<EventEnvelope<ReportReadyData>> {
    let msg = tokio::time::timeout(StdDuration::from_millis(500), stream.next())
        .await
        .ok()??;
    Some(EventEnvelope::from_bytes(&msg.payload).unwrap())
}

#[tokio::test]
async fn requested_report_is_generated_by_consumer() {
    let h = harness();
    let mut ready = h.bus.subscribe("report.ready").await.unwrap();
    start_report_consumer(h.bus.clone(), "report-workers", h.runner.clone())
        .await
        .unwrap();

    let tenant = Uuid::new_v4();
    let req = request(tenant, ReportFormat::Pdf);
    let correlation_id = req.correlation_id;
    let job = h.service.request_report(req).await.unwrap();
    assert_eq!(job.status, JobStatus::Queued);

    let event = next_ready(&mut ready).await.expect("report.ready published");
    assert_eq!(event.tenant_id, tenant);
    assert_eq!(Some(event.correlation_id), correlation_id);
    assert_eq!(event.data.report_id, job.id);
    assert_eq!(event.data.format, ReportFormat::Pdf);
    assert_eq!(
        event.data.artifact_key,
        format!("tenant/{}/reports/{}.pdf", tenant, job.id)
    );

    let stored = h.service.get_report(tenant, job.id).await.unwrap();
    assert_eq!(stored.status, JobStatus::Ready);
    assert_eq!(stored.artifact_key.as_deref(), Some(event.data.artifact_key.as_str()));
    assert_eq!(
        h.objects.content_type(&event.data.artifact_key).as_deref(),
        Some("application/pdf")
    );
    let bytes = h.objects.get(&event.data.artifact_key).await.unwrap();
    assert!(bytes.starts_with(b"%PDF-"));

    let url = h.service.download_url(tenant, job.id).await.unwrap();
    assert!(url.contains(&event.data.artifact_key));
}

#[tokio::test]
async fn duplicate_request_for_ready_report_is_a_noop() {
    let h = harness();
    let mut ready = h.bus.subscribe("report.ready").await.unwrap();
    let tenant = Uuid::new_v4();
    let job = h.service.request_report(request(tenant, ReportFormat::Csv)).await.unwrap();

    let first = h.runner.run(tenant, job.id, Uuid::new_v4()).await.unwrap();
    assert!(matches!(first, RunOutcome::Ready { .. }));
    assert!(next_ready(&mut ready).await.is_some());
    assert_eq!(h.objects.put_count(), 1);

    let second = h.runner.run(tenant, job.id, Uuid::new_v4()).await.unwrap();
    assert_eq!(second, RunOutcome::Skipped(Claim::AlreadyReady));
    assert_eq!(h.objects.put_count(), 1);
    assert!(next_ready(&mut ready).await.is_none());
}

#[tokio::test]
async fn failed_upload_is_recorded_and_rerun_reaches_ready_at_same_key() {
    let h = harness();
    let tenant = Uuid::new_v4();
    let job = h.service.request_report(request(tenant, ReportFormat::Xlsx)).await.unwrap();

    h.objects.fail_puts(true);
    let outcome = h.runner.run(tenant, job.id, Uuid::new_v4()).await.unwrap();
    assert!(matches!(outcome, RunOutcome::Failed { .. }));

    let failed = h.service.get_report(tenant, job.id).await.unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert!(failed.error.is_some());
    assert!(h.service.download_url(tenant, job.id).await.is_err());

    h.objects.fail_puts(false);
    let outcome = h.runner.run(tenant, job.id, Uuid::new_v4()).await.unwrap();
    assert_eq!(
        outcome,
        RunOutcome::Ready {
            artifact_key: job.artifact_key()
        }
    );
    assert!(h.objects.contains(&job.artifact_key()));

    let ready = h.service.get_report(tenant, job.id).await.unwrap();
    assert_eq!(ready.status, JobStatus::Ready);
    assert!(ready.error.is_none());
}

#[tokio::test]
async fn concurrent_duplicates_produce_one_artifact() {
    let h = harness();
    let tenant = Uuid::new_v4();
    let job = h.service.request_report(request(tenant, ReportFormat::Csv)).await.unwrap();

    let (a, b) = tokio::join!(
        h.runner.run(tenant, job.id, Uuid::new_v4()),
        h.runner.run(tenant, job.id, Uuid::new_v4()),
    );
    let outcomes = [a.unwrap(), b.unwrap()];

    let ready = outcomes
        .iter()
        .filter(|o| matches!(o, RunOutcome::Ready { .. }))
        .count();
    let skipped = outcomes
        .iter()
        .filter(|o| {
            matches!(
                o,
                RunOutcome::Skipped(Claim::InProgress) | RunOutcome::Skipped(Claim::AlreadyReady)
            )
        })
        .count();
    assert_eq!((ready, skipped), (1, 1));
    assert_eq!(h.objects.put_count(), 1);
}

#[tokio::test]
async fn stale_processing_job_is_reclaimed_fresh_one_is_not() {
    let h = harness();
    let tenant = Uuid::new_v4();
    let mut job = h.service.request_report(request(tenant, ReportFormat::Csv)).await.unwrap();

    job.status = JobStatus::Processing;
    job.claimed_at = Some(Utc::now() - Duration::minutes(5));
    h.jobs.put(job.clone());
    let outcome = h.runner.run(tenant, job.id, Uuid::new_v4()).await.unwrap();
    assert_eq!(outcome, RunOutcome::Skipped(Claim::InProgress));

    job.claimed_at = Some(Utc::now() - Duration::minutes(20));
    h.jobs.put(job.clone());
    let outcome = h.runner.run(tenant, job.id, Uuid::new_v4()).await.unwrap();
    assert!(matches!(outcome, RunOutcome::Ready { .. }));
}

#[tokio::test]
async fn unknown_report_is_dropped_and_acked() {
    let h = harness();
    let outcome = h
        .runner
        .run(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4())
        .await
        .unwrap();
    assert_eq!(outcome, RunOutcome::Skipped(Claim::Missing));
    assert_eq!(h.objects.put_count(), 0);
}

#[tokio::test]
async fn report_reflects_gathered_inputs() {
    let bus = Arc::new(InMemoryBus::new());
    let jobs = MemoryJobStore::new();
    let objects = MemoryObjectStore::new();
    let inputs = MemoryReportInputs::new();
    let tenant = Uuid::new_v4();
    inputs.set(
        tenant,
        ReportData {
            tenant_name: "North Field".into(),
            summary: ReportSummary {
                total_snapshots: 12,
                ..Default::default()
            },
            detections: vec![],
        },
    );
    let runner = ReportRunner::new(
        Arc::new(jobs.clone()),
        Arc::new(inputs),
        Arc::new(objects.clone()),
        EventPublisher::new(bus, "afasa-reporting"),
    );

    let job = reporting::models::ReportJob::queued(&request(tenant, ReportFormat::Csv), Utc::now()).unwrap();
    jobs.insert(&job).await.unwrap();
    runner.run(tenant, job.id, Uuid::new_v4()).await.unwrap();

    let bytes = objects.get(&job.artifact_key()).await.unwrap();
    let text = String::from_utf8(bytes).unwrap();
    assert!(text.contains("Tenant,North Field"));
    assert!(text.contains("Total Snapshots,12"));
}

#[tokio::test]
async fn custom_report_without_range_is_rejected() {
    let h = harness();
    let mut req = request(Uuid::new_v4(), ReportFormat::Csv);
    req.kind = ReportKind::Custom;
    let err = h.service.request_report(req).await.unwrap_err();
    assert!(matches!(err, reporting::PipelineError::Validation(_)));
}

#[tokio::test]
async fn slow_inputs_fail_the_job_at_the_step_timeout() {
    let h = harness();
    let tenant = Uuid::new_v4();
    let job = h.service.request_report(request(tenant, ReportFormat::Csv)).await.unwrap();
    let runner = slow_runner(h.bus.clone(), &h.jobs, &h.objects, StdDuration::from_millis(300))
        .with_step_timeout(StdDuration::from_millis(50));

    let outcome = runner.run(tenant, job.id, Uuid::new_v4()).await.unwrap();
    let RunOutcome::Failed { error } = outcome else {
        panic!("expected a failed run, got {:?}", outcome);
    };
    assert!(error.contains("gather inputs timed out"), "{}", error);

    let stored = h.jobs.get(tenant, job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Failed);
    assert_eq!(h.objects.put_count(), 0);
}

#[tokio::test]
async fn dropped_run_releases_its_claim() {
    let h = harness();
    let tenant = Uuid::new_v4();
    let job = h.service.request_report(request(tenant, ReportFormat::Csv)).await.unwrap();
    let runner = slow_runner(h.bus.clone(), &h.jobs, &h.objects, StdDuration::from_millis(300));

    // The caller gives up long before the inputs answer.
    let cut_off = tokio::time::timeout(
        StdDuration::from_millis(50),
        runner.run(tenant, job.id, Uuid::new_v4()),
    )
    .await;
    assert!(cut_off.is_err());

    assert!(wait_for_status(&h.jobs, tenant, job.id, JobStatus::Failed).await);
    let stored = h.jobs.get(tenant, job.id).await.unwrap().unwrap();
    assert_eq!(stored.error.as_deref(), Some(CANCELLED_ERROR));

    // Failed is claimable, so a re-request goes through without waiting out the lease.
    let outcome = h.runner.run(tenant, job.id, Uuid::new_v4()).await.unwrap();
    assert!(matches!(outcome, RunOutcome::Ready { .. }));
    assert_eq!(h.objects.put_count(), 1);
}

#[tokio::test]
async fn consumer_never_leaves_a_slow_report_processing() {
    let h = harness();
    let runner = slow_runner(h.bus.clone(), &h.jobs, &h.objects, StdDuration::from_millis(300))
        .with_step_timeout(StdDuration::from_millis(30));
    assert!(runner.run_deadline() < StdDuration::from_millis(300));
    start_report_consumer(h.bus.clone(), "report-workers", runner)
        .await
        .unwrap();

    let tenant = Uuid::new_v4();
    let job = h.service.request_report(request(tenant, ReportFormat::Csv)).await.unwrap();

    assert!(wait_for_status(&h.jobs, tenant, job.id, JobStatus::Failed).await);
    let stored = h.jobs.get(tenant, job.id).await.unwrap().unwrap();
    assert!(stored.error.unwrap().contains("timed out"));
    assert_eq!(h.objects.put_count(), 0);
}
