//! Core job types.
//!
//! A [`Job`] is a plain data record: state transitions are enforced by
//! [`crate::transition`] and applied by the store, never by methods mutating
//! the record in place.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use quillerp_auth::PrincipalId;
use quillerp_core::{JobId, TemplateId, TenantId};

/// Job category, one queue lane per variant.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobCategory {
    Export,
    Print,
    BulkOperation,
}

impl JobCategory {
    pub const ALL: [JobCategory; 3] = [
        JobCategory::Export,
        JobCategory::Print,
        JobCategory::BulkOperation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobCategory::Export => "export",
            JobCategory::Print => "print",
            JobCategory::BulkOperation => "bulk_operation",
        }
    }
}

impl core::fmt::Display for JobCategory {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output format for export jobs.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    Csv,
    Xlsx,
    Pdf,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Xlsx => "xlsx",
            OutputFormat::Pdf => "pdf",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "text/csv",
            OutputFormat::Xlsx => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
            OutputFormat::Pdf => "application/pdf",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "csv" => Some(Self::Csv),
            "xlsx" => Some(Self::Xlsx),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }
}

impl core::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.extension())
    }
}

/// Inclusive creation-date window used by export filters and job listings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn is_ordered(&self) -> bool {
        match (self.from, self.to) {
            (Some(from), Some(to)) => from <= to,
            _ => true,
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from.is_none_or(|f| at >= f) && self.to.is_none_or(|t| at <= t)
    }
}

/// Entity filter criteria for scoped reads (export jobs).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterCriteria {
    #[serde(default)]
    pub date_range: DateRange,
    /// Entity status field, if the entity kind has one.
    pub status: Option<String>,
    /// Field equality constraints.
    #[serde(default)]
    pub fields: BTreeMap<String, serde_json::Value>,
}

/// Reference to a print/export template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateRef {
    /// A stored template, by id.
    Id(TemplateId),
    /// A one-off inline template supplied with the request.
    Inline(InlineTemplate),
}

/// One-off template carried in the job parameters instead of the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineTemplate {
    pub content: String,
    #[serde(default)]
    pub layout: crate::template::TemplateLayout,
}

/// Parameters for an export job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportParams {
    pub entity_type: String,
    pub format: OutputFormat,
    /// Explicit id scope; `None` means "everything matching the filters".
    pub entity_ids: Option<Vec<String>>,
    #[serde(default)]
    pub filters: FilterCriteria,
    /// Columns to include; empty means all columns.
    #[serde(default)]
    pub columns: Vec<String>,
    /// Required when `format` is pdf.
    pub template: Option<TemplateRef>,
    #[serde(default)]
    pub options: serde_json::Value,
}

/// Parameters for a print job (always renders a paginated document).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrintParams {
    pub entity_type: String,
    pub entity_ids: Vec<String>,
    /// Document kind used for template lookup (e.g. "invoice", "payslip").
    pub doc_type: String,
    /// Explicit or inline template; `None` selects the doc_type default.
    pub template: Option<TemplateRef>,
    #[serde(default)]
    pub options: serde_json::Value,
}

/// Parameters for a bulk mutation job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkParams {
    pub entity_type: String,
    pub entity_ids: Vec<String>,
    pub mutation: BulkMutation,
}

/// The mutation a bulk-operation job applies to each target entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum BulkMutation {
    SetField {
        field: String,
        value: serde_json::Value,
    },
    SetStatus {
        status: String,
    },
    Delete,
}

impl BulkMutation {
    /// Whether a pre-mutation snapshot is retained for operator undo.
    ///
    /// Deletes are not undoable through a snapshot (re-creation is a separate
    /// operator workflow), so no snapshot is kept for them.
    pub fn supports_undo(&self) -> bool {
        matches!(self, BulkMutation::SetField { .. } | BulkMutation::SetStatus { .. })
    }

    pub fn describe(&self) -> String {
        match self {
            BulkMutation::SetField { field, .. } => format!("set_field:{field}"),
            BulkMutation::SetStatus { status } => format!("set_status:{status}"),
            BulkMutation::Delete => "delete".to_string(),
        }
    }
}

/// Category-scoped job parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum JobParams {
    Export(ExportParams),
    Print(PrintParams),
    BulkOperation(BulkParams),
}

impl JobParams {
    pub fn category(&self) -> JobCategory {
        match self {
            JobParams::Export(_) => JobCategory::Export,
            JobParams::Print(_) => JobCategory::Print,
            JobParams::BulkOperation(_) => JobCategory::BulkOperation,
        }
    }

    pub fn entity_type(&self) -> &str {
        match self {
            JobParams::Export(p) => &p.entity_type,
            JobParams::Print(p) => &p.entity_type,
            JobParams::BulkOperation(p) => &p.entity_type,
        }
    }

    /// Output format, where the category has one.
    pub fn format(&self) -> Option<OutputFormat> {
        match self {
            JobParams::Export(p) => Some(p.format),
            // Print always produces a paginated document.
            JobParams::Print(_) => Some(OutputFormat::Pdf),
            JobParams::BulkOperation(_) => None,
        }
    }

    pub fn entity_ids(&self) -> Option<&[String]> {
        match self {
            JobParams::Export(p) => p.entity_ids.as_deref(),
            JobParams::Print(p) => Some(&p.entity_ids),
            JobParams::BulkOperation(p) => Some(&p.entity_ids),
        }
    }
}

/// Job execution status.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Queued, waiting to be picked up.
    Pending,
    /// Claimed by a worker.
    Processing,
    /// Finished; artifact available until expiry.
    Completed,
    /// Bulk only: some records succeeded, some failed.
    PartiallyCompleted,
    /// Unrecoverable error or retry budget exhausted.
    Failed,
    /// Explicitly cancelled before completion.
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed
                | JobStatus::PartiallyCompleted
                | JobStatus::Failed
                | JobStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::PartiallyCompleted => "partially_completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "partially_completed" => Some(Self::PartiallyCompleted),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

impl core::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record counters, pollable mid-run.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordCounts {
    pub total: u64,
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
}

/// Per-record failure detail for bulk operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordError {
    pub entity_id: String,
    pub message: String,
}

/// Reference to a produced artifact on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub path: PathBuf,
    pub file_name: String,
    pub size_bytes: u64,
    pub mime_type: String,
}

/// Pre-mutation snapshot retained for undo-capable bulk mutations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UndoSnapshot {
    pub rows: Vec<crate::repository::EntityRow>,
    pub expires_at: DateTime<Utc>,
}

/// Result payload written when a job finishes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobOutput {
    pub artifact: Option<ArtifactRef>,
    pub pages: Option<u32>,
    #[serde(default)]
    pub record_errors: Vec<RecordError>,
    pub undo: Option<UndoSnapshot>,
}

/// An asynchronous job record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub tenant_id: TenantId,
    /// Requesting principal; reads/downloads/deletes are scoped to it.
    pub owner: PrincipalId,
    pub category: JobCategory,
    pub params: JobParams,
    pub status: JobStatus,
    /// Percentage in [0,100]; writes are monotonically non-decreasing.
    pub progress: u8,
    pub counts: RecordCounts,
    pub output: Option<JobOutput>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Set only when status is completed; always >= completed_at.
    pub expires_at: Option<DateTime<Utc>>,
    pub download_count: u32,
}

impl Job {
    /// Create a new pending job record. Validation happens at the gateway
    /// before this is called.
    pub fn new(tenant_id: TenantId, owner: PrincipalId, params: JobParams) -> Self {
        Self {
            id: JobId::new(),
            tenant_id,
            owner,
            category: params.category(),
            params,
            status: JobStatus::Pending,
            progress: 0,
            counts: RecordCounts::default(),
            output: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            expires_at: None,
            download_count: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_job_is_pending_with_zero_progress() {
        let params = JobParams::Export(ExportParams {
            entity_type: "invoice".to_string(),
            format: OutputFormat::Csv,
            entity_ids: None,
            filters: FilterCriteria::default(),
            columns: vec![],
            template: None,
            options: serde_json::Value::Null,
        });
        let job = Job::new(TenantId::new(), PrincipalId::new(), params);

        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.progress, 0);
        assert_eq!(job.category, JobCategory::Export);
        assert!(job.output.is_none());
        assert!(job.expires_at.is_none());
    }

    #[test]
    fn date_range_ordering() {
        let now = Utc::now();
        let ok = DateRange {
            from: Some(now),
            to: Some(now + chrono::Duration::days(1)),
        };
        let bad = DateRange {
            from: Some(now),
            to: Some(now - chrono::Duration::days(1)),
        };
        assert!(ok.is_ordered());
        assert!(!bad.is_ordered());
        assert!(DateRange::default().is_ordered());
    }

    #[test]
    fn bulk_mutation_undo_support() {
        assert!(BulkMutation::SetStatus { status: "archived".into() }.supports_undo());
        assert!(!BulkMutation::Delete.supports_undo());
    }

    #[test]
    fn params_serde_roundtrip_is_tagged_by_category() {
        let params = JobParams::BulkOperation(BulkParams {
            entity_type: "employee".to_string(),
            entity_ids: vec!["e1".to_string()],
            mutation: BulkMutation::SetStatus { status: "inactive".to_string() },
        });
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["category"], "bulk_operation");
        let back: JobParams = serde_json::from_value(json).unwrap();
        assert_eq!(back, params);
    }
}
