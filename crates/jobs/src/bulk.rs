//! Bulk operation execution.
//!
//! Each target entity is mutated independently; one bad record never aborts
//! the rest. Undo-capable mutations retain the pre-mutation rows as a
//! snapshot with the same retention window as artifacts.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::processor::{JobError, ProcessorContext, RunOutcome};
use crate::types::{BulkParams, Job, JobOutput, RecordCounts, RecordError, UndoSnapshot};

pub(crate) fn run(
    ctx: &ProcessorContext,
    job: &Job,
    params: &BulkParams,
    now: DateTime<Utc>,
) -> Result<RunOutcome, JobError> {
    let total = params.entity_ids.len() as u64;
    let mut counts = RecordCounts {
        total,
        ..Default::default()
    };
    let mut record_errors = Vec::new();
    let mut snapshots = Vec::new();
    let keep_snapshots = params.mutation.supports_undo();

    for (i, id) in params.entity_ids.iter().enumerate() {
        match ctx
            .repository
            .apply(job.tenant_id, &params.entity_type, id, &params.mutation)
        {
            Ok(snapshot) => {
                counts.succeeded += 1;
                if keep_snapshots {
                    snapshots.push(snapshot);
                }
            }
            Err(e) => {
                counts.failed += 1;
                record_errors.push(RecordError {
                    entity_id: id.clone(),
                    message: e.to_string(),
                });
            }
        }
        counts.processed = (i + 1) as u64;

        // Pollable mid-run progress, scaled to leave room for completion.
        let progress = ((counts.processed * 95) / total.max(1)) as u8;
        ctx.progress(job.id, progress, counts);
    }

    debug!(
        job_id = %job.id,
        mutation = %params.mutation.describe(),
        succeeded = counts.succeeded,
        failed = counts.failed,
        "bulk operation applied"
    );

    if counts.succeeded == 0 {
        return Err(JobError::Unrecoverable(format!(
            "all {} records failed: {}",
            counts.failed,
            record_errors
                .first()
                .map(|e| e.message.as_str())
                .unwrap_or("unknown error")
        )));
    }

    let undo = (keep_snapshots && !snapshots.is_empty()).then(|| UndoSnapshot {
        rows: snapshots,
        expires_at: now + ctx.retention,
    });
    let output = JobOutput {
        artifact: None,
        pages: None,
        record_errors,
        undo,
    };

    if counts.failed > 0 {
        Ok(RunOutcome::PartiallyCompleted(output))
    } else {
        Ok(RunOutcome::Completed(output))
    }
}
