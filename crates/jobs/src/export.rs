//! Export job execution: scoped entity read, render, artifact write.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::processor::{JobError, ProcessorContext, RunOutcome};
use crate::render::RenderRequest;
use crate::repository::EntityRow;
use crate::types::{ExportParams, Job, JobCategory, JobOutput, RecordCounts, RecordError};

pub(crate) fn run(
    ctx: &ProcessorContext,
    job: &Job,
    params: &ExportParams,
    now: DateTime<Utc>,
) -> Result<RunOutcome, JobError> {
    let (rows, record_errors) = gather_rows(ctx, job, params)?;
    let mut counts = RecordCounts {
        total: (rows.len() + record_errors.len()) as u64,
        processed: (rows.len() + record_errors.len()) as u64,
        succeeded: rows.len() as u64,
        failed: record_errors.len() as u64,
    };
    ctx.progress(job.id, 30, counts);

    if rows.is_empty() {
        return Err(JobError::Unrecoverable(
            "no matching records to export".to_string(),
        ));
    }

    let template = match &params.template {
        Some(reference) => Some(
            ctx.templates
                .resolve(job.tenant_id, &params.entity_type, Some(reference))
                .map_err(|e| JobError::Unrecoverable(e.to_string()))?,
        ),
        None => None,
    };

    let document = ctx
        .renderer
        .render(&RenderRequest {
            format: params.format,
            title: format!("{} export", params.entity_type),
            columns: params.columns.clone(),
            rows,
            template,
            options: params.options.clone(),
        })
        .map_err(|e| JobError::Unrecoverable(e.to_string()))?;
    ctx.progress(job.id, 80, counts);

    let artifact = ctx
        .artifacts
        .write(
            JobCategory::Export,
            &params.entity_type,
            job.id,
            now,
            params.format.extension(),
            &document.mime_type,
            &document.bytes,
        )
        .map_err(|e| JobError::Transient(format!("artifact write failed: {e}")))?;
    counts.processed = counts.total;
    ctx.progress(job.id, 95, counts);
    debug!(job_id = %job.id, file = %artifact.file_name, "export rendered");

    Ok(RunOutcome::Completed(JobOutput {
        artifact: Some(artifact),
        pages: document.pages,
        record_errors,
        undo: None,
    }))
}

/// Rows for the export scope: explicit ids (missing ones become per-record
/// errors) or a filtered query.
fn gather_rows(
    ctx: &ProcessorContext,
    job: &Job,
    params: &ExportParams,
) -> Result<(Vec<EntityRow>, Vec<RecordError>), JobError> {
    match &params.entity_ids {
        Some(ids) => {
            let mut rows = Vec::with_capacity(ids.len());
            let mut errors = Vec::new();
            for id in ids {
                match ctx.repository.fetch(job.tenant_id, &params.entity_type, id) {
                    Ok(row) => rows.push(row),
                    Err(e) => errors.push(RecordError {
                        entity_id: id.clone(),
                        message: e.to_string(),
                    }),
                }
            }
            Ok((rows, errors))
        }
        None => {
            let rows = ctx
                .repository
                .query(job.tenant_id, &params.entity_type, &params.filters)
                .map_err(|e| JobError::Transient(format!("entity query failed: {e}")))?;
            Ok((rows, Vec::new()))
        }
    }
}
