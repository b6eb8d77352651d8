//! Print job execution: fetch the requested documents, bind the resolved
//! template and write one paginated artifact.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::processor::{JobError, ProcessorContext, RunOutcome};
use crate::render::RenderRequest;
use crate::types::{
    Job, JobCategory, JobOutput, OutputFormat, PrintParams, RecordCounts, RecordError,
};

pub(crate) fn run(
    ctx: &ProcessorContext,
    job: &Job,
    params: &PrintParams,
    now: DateTime<Utc>,
) -> Result<RunOutcome, JobError> {
    // Re-resolved at run time: the template may have been edited or deleted
    // since submission, and the current version is what prints.
    let template = ctx
        .templates
        .resolve(job.tenant_id, &params.doc_type, params.template.as_ref())
        .map_err(|e| JobError::Unrecoverable(e.to_string()))?;

    let mut rows = Vec::with_capacity(params.entity_ids.len());
    let mut record_errors = Vec::new();
    for id in &params.entity_ids {
        match ctx.repository.fetch(job.tenant_id, &params.entity_type, id) {
            Ok(row) => rows.push(row),
            Err(e) => record_errors.push(RecordError {
                entity_id: id.clone(),
                message: e.to_string(),
            }),
        }
    }
    let counts = RecordCounts {
        total: params.entity_ids.len() as u64,
        processed: params.entity_ids.len() as u64,
        succeeded: rows.len() as u64,
        failed: record_errors.len() as u64,
    };
    ctx.progress(job.id, 40, counts);

    if rows.is_empty() {
        return Err(JobError::Unrecoverable(
            "none of the requested documents exist".to_string(),
        ));
    }

    let document = ctx
        .renderer
        .render(&RenderRequest {
            format: OutputFormat::Pdf,
            title: format!("{} {}", params.entity_type, params.doc_type),
            columns: vec![],
            rows,
            template: Some(template),
            options: params.options.clone(),
        })
        .map_err(|e| JobError::Unrecoverable(e.to_string()))?;
    ctx.progress(job.id, 85, counts);

    let artifact = ctx
        .artifacts
        .write(
            JobCategory::Print,
            &params.entity_type,
            job.id,
            now,
            OutputFormat::Pdf.extension(),
            &document.mime_type,
            &document.bytes,
        )
        .map_err(|e| JobError::Transient(format!("artifact write failed: {e}")))?;
    debug!(job_id = %job.id, file = %artifact.file_name, pages = ?document.pages, "print rendered");

    Ok(RunOutcome::Completed(JobOutput {
        artifact: Some(artifact),
        pages: document.pages,
        record_errors,
        undo: None,
    }))
}
