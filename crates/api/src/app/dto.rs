//! Request/response DTOs and JSON mapping helpers.
//!
//! The wire format is camelCase; the domain types stay snake_case. Mapping
//! lives here so handlers only shuttle data.

use std::collections::BTreeMap;

use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use quillerp_core::TemplateId;
use quillerp_jobs::template::{NewTemplate, Template, TemplateLayout, TemplateUpdate};
use quillerp_jobs::types::{
    BulkParams, DateRange, ExportParams, FilterCriteria, InlineTemplate, PrintParams, TemplateRef,
};
use quillerp_jobs::{BulkMutation, Job, JobEstimate, OutputFormat};

use crate::app::errors;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateExportRequest {
    pub entity_type: String,
    pub format: String,
    pub entity_ids: Option<Vec<String>>,
    pub filters: Option<FilterDto>,
    #[serde(default)]
    pub columns: Vec<String>,
    pub template_id: Option<String>,
    pub template: Option<InlineTemplateDto>,
    pub options: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePrintRequest {
    pub entity_type: String,
    pub entity_ids: Vec<String>,
    pub doc_type: String,
    pub template_id: Option<String>,
    pub template: Option<InlineTemplateDto>,
    pub options: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBulkRequest {
    pub entity_type: String,
    pub entity_ids: Vec<String>,
    pub operation: BulkMutation,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterDto {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub status: Option<String>,
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
}

impl From<FilterDto> for FilterCriteria {
    fn from(dto: FilterDto) -> Self {
        Self {
            date_range: DateRange {
                from: dto.from,
                to: dto.to,
            },
            status: dto.status,
            fields: dto.fields,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct InlineTemplateDto {
    pub content: String,
    #[serde(default)]
    pub layout: TemplateLayout,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTemplateRequest {
    pub name: String,
    pub doc_type: String,
    pub content: String,
    #[serde(default)]
    pub layout: TemplateLayout,
    #[serde(default)]
    pub is_default: bool,
}

impl From<CreateTemplateRequest> for NewTemplate {
    fn from(dto: CreateTemplateRequest) -> Self {
        Self {
            name: dto.name,
            doc_type: dto.doc_type,
            content: dto.content,
            layout: dto.layout,
            is_default: dto.is_default,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTemplateRequest {
    pub name: Option<String>,
    pub content: Option<String>,
    pub layout: Option<TemplateLayout>,
}

impl From<UpdateTemplateRequest> for TemplateUpdate {
    fn from(dto: UpdateTemplateRequest) -> Self {
        Self {
            name: dto.name,
            content: dto.content,
            layout: dto.layout,
        }
    }
}

/// Listing query parameters, shared by all job list endpoints.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<String>,
    pub format: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

pub fn parse_format(s: &str) -> Result<OutputFormat, axum::response::Response> {
    OutputFormat::parse(s).ok_or_else(|| {
        errors::json_error(
            StatusCode::BAD_REQUEST,
            "invalid_format",
            "format must be one of: csv, xlsx, pdf",
        )
    })
}

/// Resolve the optional template reference carried by a create request.
pub fn template_ref(
    template_id: Option<String>,
    inline: Option<InlineTemplateDto>,
) -> Result<Option<TemplateRef>, axum::response::Response> {
    match (template_id, inline) {
        (Some(_), Some(_)) => Err(errors::json_error(
            StatusCode::BAD_REQUEST,
            "invalid_template",
            "provide either templateId or an inline template, not both",
        )),
        (Some(id), None) => {
            let id: TemplateId = id.parse().map_err(|_| {
                errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid templateId")
            })?;
            Ok(Some(TemplateRef::Id(id)))
        }
        (None, Some(inline)) => Ok(Some(TemplateRef::Inline(InlineTemplate {
            content: inline.content,
            layout: inline.layout,
        }))),
        (None, None) => Ok(None),
    }
}

pub fn export_params(body: CreateExportRequest) -> Result<ExportParams, axum::response::Response> {
    Ok(ExportParams {
        entity_type: body.entity_type,
        format: parse_format(&body.format)?,
        entity_ids: body.entity_ids,
        filters: body.filters.map(Into::into).unwrap_or_default(),
        columns: body.columns,
        template: template_ref(body.template_id, body.template)?,
        options: body.options.unwrap_or(Value::Null),
    })
}

pub fn print_params(body: CreatePrintRequest) -> Result<PrintParams, axum::response::Response> {
    Ok(PrintParams {
        entity_type: body.entity_type,
        entity_ids: body.entity_ids,
        doc_type: body.doc_type,
        template: template_ref(body.template_id, body.template)?,
        options: body.options.unwrap_or(Value::Null),
    })
}

pub fn bulk_params(body: CreateBulkRequest) -> BulkParams {
    BulkParams {
        entity_type: body.entity_type,
        entity_ids: body.entity_ids,
        mutation: body.operation,
    }
}

pub fn submit_to_json(job: &Job, estimate: &JobEstimate) -> Value {
    json!({
        "jobId": job.id.to_string(),
        "status": job.status.as_str(),
        "records": estimate.records,
        "estimatedTimeMs": estimate.duration.as_millis() as u64,
        "estimatedSizeBytes": estimate.approx_size_bytes,
    })
}

pub fn job_to_json(job: &Job) -> Value {
    let output = job.output.as_ref().map(|o| {
        json!({
            "fileName": o.artifact.as_ref().map(|a| a.file_name.clone()),
            "fileSizeBytes": o.artifact.as_ref().map(|a| a.size_bytes),
            "mimeType": o.artifact.as_ref().map(|a| a.mime_type.clone()),
            "pages": o.pages,
            "recordErrors": o.record_errors.iter().map(|e| json!({
                "entityId": e.entity_id,
                "message": e.message,
            })).collect::<Vec<_>>(),
            "undoAvailableUntil": o.undo.as_ref().map(|u| u.expires_at.to_rfc3339()),
        })
    });

    json!({
        "id": job.id.to_string(),
        "category": job.category.as_str(),
        "entityType": job.params.entity_type(),
        "format": job.params.format().map(|f| f.extension()),
        "status": job.status.as_str(),
        "progress": job.progress,
        "counts": {
            "total": job.counts.total,
            "processed": job.counts.processed,
            "succeeded": job.counts.succeeded,
            "failed": job.counts.failed,
        },
        "error": job.error,
        "output": output,
        "downloadCount": job.download_count,
        "createdAt": job.created_at.to_rfc3339(),
        "startedAt": job.started_at.map(|t| t.to_rfc3339()),
        "completedAt": job.completed_at.map(|t| t.to_rfc3339()),
        "expiresAt": job.expires_at.map(|t| t.to_rfc3339()),
    })
}

pub fn template_to_json(template: &Template) -> Value {
    json!({
        "id": template.id.to_string(),
        "name": template.name,
        "docType": template.doc_type,
        "content": template.content,
        "layout": template.layout,
        "version": template.version,
        "isDefault": template.is_default,
        "createdAt": template.created_at.to_rfc3339(),
        "updatedAt": template.updated_at.to_rfc3339(),
    })
}
