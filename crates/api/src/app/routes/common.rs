//! Category-agnostic job handlers.
//!
//! Exports, prints and bulk operations share the same read/cancel/download
//! lifecycle; only submission differs. Category modules wrap these with their
//! lane and permission resource fixed.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;

use quillerp_auth::Permission;
use quillerp_core::{JobId, Pagination};
use quillerp_jobs::types::DateRange;
use quillerp_jobs::{JobCategory, JobListFilter, JobStatus, OutputFormat};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{PrincipalContext, TenantContext};

pub fn require(
    tenant: &TenantContext,
    principal: &PrincipalContext,
    resource: &str,
    action: &str,
) -> Result<(), axum::response::Response> {
    crate::authz::require(tenant, principal, &Permission::for_action(resource, action))
        .map_err(errors::authz_error_to_response)
}

pub fn parse_job_id(raw: &str) -> Result<JobId, axum::response::Response> {
    raw.parse().map_err(|_| {
        errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid job id")
    })
}

pub fn get_job(
    services: &AppServices,
    tenant: &TenantContext,
    principal: &PrincipalContext,
    resource: &str,
    raw_id: &str,
) -> axum::response::Response {
    if let Err(resp) = require(tenant, principal, resource, "read") {
        return resp;
    }
    let job_id = match parse_job_id(raw_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services
        .store
        .get_owned(tenant.tenant_id(), job_id, principal.principal_id())
    {
        Ok(job) => (StatusCode::OK, Json(dto::job_to_json(&job))).into_response(),
        Err(e) => errors::domain_error_to_response(e.into()),
    }
}

pub fn list_jobs(
    services: &AppServices,
    tenant: &TenantContext,
    principal: &PrincipalContext,
    resource: &str,
    category: JobCategory,
    query: dto::ListQuery,
) -> axum::response::Response {
    if let Err(resp) = require(tenant, principal, resource, "read") {
        return resp;
    }

    let status = match &query.status {
        Some(raw) => match JobStatus::parse(raw) {
            Some(s) => Some(s),
            None => {
                return errors::json_error(
                    StatusCode::BAD_REQUEST,
                    "invalid_status",
                    "unknown status filter",
                )
            }
        },
        None => None,
    };
    let format = match &query.format {
        Some(raw) => match OutputFormat::parse(raw) {
            Some(f) => Some(f),
            None => {
                return errors::json_error(
                    StatusCode::BAD_REQUEST,
                    "invalid_format",
                    "unknown format filter",
                )
            }
        },
        None => None,
    };

    let filter = JobListFilter {
        owner: Some(principal.principal_id()),
        category: Some(category),
        status,
        format,
        created: DateRange {
            from: query.from,
            to: query.to,
        },
    };
    let pagination = Pagination::new(query.page, query.limit);

    match services.store.list(tenant.tenant_id(), &filter, pagination) {
        Ok(page) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "items": page.items.iter().map(dto::job_to_json).collect::<Vec<_>>(),
                "page": page.page,
                "limit": page.limit,
                "total": page.total,
                "totalPages": page.total_pages(),
            })),
        )
            .into_response(),
        Err(e) => errors::domain_error_to_response(e.into()),
    }
}

/// Aggregate usage counters for one category: tenant-scoped store stats plus
/// the lane's current depth and delivery tallies (the queue is process-wide;
/// its counters are operational, not per tenant).
pub fn category_stats(
    services: &AppServices,
    tenant: &TenantContext,
    principal: &PrincipalContext,
    resource: &str,
    category: JobCategory,
) -> axum::response::Response {
    if let Err(resp) = require(tenant, principal, resource, "read") {
        return resp;
    }

    let stats = match services.store.stats(tenant.tenant_id(), Some(category)) {
        Ok(stats) => stats,
        Err(e) => return errors::domain_error_to_response(e.into()),
    };
    let history = services.queue.history(category);
    let delivered_ok = history.iter().filter(|h| h.succeeded).count();
    let delivered_failed = history.len() - delivered_ok;

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "jobs": stats,
            "queueDepth": services.queue.depth(category),
            "deliveries": {
                "succeeded": delivered_ok,
                "failed": delivered_failed,
            },
        })),
    )
        .into_response()
}

pub fn cancel_job(
    services: &AppServices,
    tenant: &TenantContext,
    principal: &PrincipalContext,
    resource: &str,
    raw_id: &str,
) -> axum::response::Response {
    if let Err(resp) = require(tenant, principal, resource, "cancel") {
        return resp;
    }
    let job_id = match parse_job_id(raw_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.cancel(
        tenant.tenant_id(),
        job_id,
        principal.principal_id(),
        Utc::now(),
    ) {
        Ok(job) => (StatusCode::OK, Json(dto::job_to_json(&job))).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn download_job(
    services: &AppServices,
    tenant: &TenantContext,
    principal: &PrincipalContext,
    resource: &str,
    raw_id: &str,
) -> axum::response::Response {
    if let Err(resp) = require(tenant, principal, resource, "download") {
        return resp;
    }
    let job_id = match parse_job_id(raw_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let grant = match services.lifecycle.download(
        tenant.tenant_id(),
        job_id,
        principal.principal_id(),
        Utc::now(),
    ) {
        Ok(grant) => grant,
        Err(e) => return errors::domain_error_to_response(e),
    };

    let bytes = match tokio::fs::read(&grant.path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(%job_id, error = %e, "artifact missing on disk");
            return errors::json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "artifact_unreadable",
                "the artifact could not be read",
            );
        }
    };

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, grant.mime_type.clone()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", grant.file_name),
            ),
        ],
        Body::from(bytes),
    )
        .into_response()
}

/// DELETE semantics: an unfinished job is cancelled (returned as the updated
/// record), a finished one is removed along with its artifact.
pub fn delete_job(
    services: &AppServices,
    tenant: &TenantContext,
    principal: &PrincipalContext,
    resource: &str,
    raw_id: &str,
) -> axum::response::Response {
    if let Err(resp) = require(tenant, principal, resource, "delete") {
        return resp;
    }
    let job_id = match parse_job_id(raw_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let job = match services
        .store
        .get_owned(tenant.tenant_id(), job_id, principal.principal_id())
    {
        Ok(job) => job,
        Err(e) => return errors::domain_error_to_response(e.into()),
    };

    if !job.status.is_terminal() {
        return match services.cancel(
            tenant.tenant_id(),
            job_id,
            principal.principal_id(),
            Utc::now(),
        ) {
            Ok(job) => (StatusCode::OK, Json(dto::job_to_json(&job))).into_response(),
            Err(e) => errors::domain_error_to_response(e),
        };
    }

    match services
        .lifecycle
        .delete(tenant.tenant_id(), job_id, principal.principal_id())
    {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

/// Shared 202 submission response.
pub fn accepted(job: &quillerp_jobs::Job, estimate: &quillerp_jobs::JobEstimate) -> axum::response::Response {
    (StatusCode::ACCEPTED, Json(dto::submit_to_json(job, estimate))).into_response()
}

/// Convenience: unwrap the services extension in handlers.
pub type Services = axum::extract::Extension<Arc<AppServices>>;
