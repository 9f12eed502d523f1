use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "report_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ReportKind {
    Daily,
    Weekly,
    Monthly,
    Custom,
}

impl ReportKind {
    /// Look-back window for the preset kinds.
    pub fn default_window(&self) -> Option<Duration> {
        match self {
            ReportKind::Daily => Some(Duration::hours(24)),
            ReportKind::Weekly => Some(Duration::days(7)),
            ReportKind::Monthly => Some(Duration::days(30)),
            ReportKind::Custom => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "report_format", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Pdf,
    Xlsx,
    Csv,
}

impl ReportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Pdf => "pdf",
            ReportFormat::Xlsx => "xlsx",
            ReportFormat::Csv => "csv",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ReportFormat::Pdf => "application/pdf",
            ReportFormat::Xlsx => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
            ReportFormat::Csv => "text/csv",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "job_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Ready,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Ready => "ready",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ReportJob {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub kind: ReportKind,
    pub format: ReportFormat,
    pub range_from: DateTime<Utc>,
    pub range_to: DateTime<Utc>,
    pub status: JobStatus,
    pub artifact_key: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ReportJob {
    pub fn queued(request: &ReportRequest, now: DateTime<Utc>) -> Result<Self, String> {
        let (range_from, range_to) = request.resolve_range(now)?;
        Ok(Self {
            id: Uuid::new_v4(),
            tenant_id: request.tenant_id,
            kind: request.kind,
            format: request.format,
            range_from,
            range_to,
            status: JobStatus::Queued,
            artifact_key: None,
            error: None,
            created_at: now,
            claimed_at: None,
            completed_at: None,
        })
    }

    /// Deterministic, so a re-run overwrites the previous upload.
    pub fn artifact_key(&self) -> String {
        artifact_key(self.tenant_id, self.id, self.format)
    }
}

pub fn artifact_key(tenant_id: Uuid, report_id: Uuid, format: ReportFormat) -> String {
    blob_storage::tenant_key(
        tenant_id,
        &format!("reports/{}.{}", report_id, format.extension()),
    )
}

#[derive(Debug, Clone)]
pub struct ReportRequest {
    pub tenant_id: Uuid,
    pub kind: ReportKind,
    pub format: ReportFormat,
    pub range_from: Option<DateTime<Utc>>,
    pub range_to: Option<DateTime<Utc>>,
    pub correlation_id: Option<Uuid>,
}

impl ReportRequest {
    /// Explicit bounds win; preset kinds fill in a window ending at `now`.
    pub fn resolve_range(&self, now: DateTime<Utc>) -> Result<(DateTime<Utc>, DateTime<Utc>), String> {
        let (from, to) = match (self.kind.default_window(), self.range_from, self.range_to) {
            (_, Some(from), Some(to)) => (from, to),
            (Some(window), from, to) => {
                let to = to.unwrap_or(now);
                (from.unwrap_or(to - window), to)
            }
            (None, _, _) => {
                return Err("custom reports require range_from and range_to".to_string())
            }
        };

        if from >= to {
            return Err("range_from must be before range_to".to_string());
        }
        Ok((from, to))
    }
}

/// `report.requested` payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportRequestedData {
    pub report_id: Uuid,
}

/// `report.ready` payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportReadyData {
    pub report_id: Uuid,
    pub artifact_key: String,
    pub format: ReportFormat,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn request(kind: ReportKind) -> ReportRequest {
        ReportRequest {
            tenant_id: Uuid::new_v4(),
            kind,
            format: ReportFormat::Pdf,
            range_from: None,
            range_to: None,
            correlation_id: None,
        }
    }

    #[test]
    fn test_preset_windows_end_now() {
        let now = Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap();

        let (from, to) = request(ReportKind::Daily).resolve_range(now).unwrap();
        assert_eq!(to, now);
        assert_eq!(from, now - Duration::hours(24));

        let (from, _) = request(ReportKind::Weekly).resolve_range(now).unwrap();
        assert_eq!(from, now - Duration::days(7));

        let (from, _) = request(ReportKind::Monthly).resolve_range(now).unwrap();
        assert_eq!(from, now - Duration::days(30));
    }

    #[test]
    fn test_custom_requires_range() {
        let now = Utc::now();
        assert!(request(ReportKind::Custom).resolve_range(now).is_err());

        let mut custom = request(ReportKind::Custom);
        custom.range_from = Some(now - Duration::days(3));
        custom.range_to = Some(now);
        assert!(custom.resolve_range(now).is_ok());

        custom.range_from = Some(now);
        assert!(custom.resolve_range(now).is_err());
    }

    #[test]
    fn test_artifact_key_is_tenant_scoped() {
        let tenant = Uuid::new_v4();
        let report = Uuid::new_v4();
        assert_eq!(
            artifact_key(tenant, report, ReportFormat::Xlsx),
            format!("tenant/{}/reports/{}.xlsx", tenant, report)
        );
    }
}
