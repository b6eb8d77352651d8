use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};

use quillerp_auth::Permission;
use quillerp_jobs::JobCategory;

use crate::app::errors;
use crate::app::routes::common::Services;
use crate::context::{PrincipalContext, TenantContext};

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> impl IntoResponse {
    Json(serde_json::json!({
        "tenant_id": tenant.tenant_id().to_string(),
        "principal_id": principal.principal_id().to_string(),
        "roles": principal.roles().iter().map(|r| r.as_str()).collect::<Vec<_>>(),
    }))
}

/// Tenant-wide job counters plus current queue depths.
pub async fn job_stats(
    Extension(services): Services,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    if let Err(e) = crate::authz::require(&tenant, &principal, &Permission::new("jobs.stats")) {
        return errors::authz_error_to_response(e);
    }

    let stats = match services.store.stats(tenant.tenant_id(), None) {
        Ok(stats) => stats,
        Err(e) => return errors::domain_error_to_response(e.into()),
    };

    let depths: serde_json::Map<String, serde_json::Value> = JobCategory::ALL
        .iter()
        .map(|c| {
            (
                c.as_str().to_string(),
                serde_json::json!(services.queue.depth(*c)),
            )
        })
        .collect();

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "jobs": stats,
            "queueDepths": depths,
        })),
    )
        .into_response()
}

/// Insert demo entities for the caller's tenant (in-memory backend only).
pub async fn seed_demo(
    Extension(services): Services,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    if let Err(e) = crate::authz::require(&tenant, &principal, &Permission::new("admin.seed")) {
        return errors::authz_error_to_response(e);
    }

    let rows = services.seed_demo_data(tenant.tenant_id());
    (StatusCode::OK, Json(serde_json::json!({ "rows": rows }))).into_response()
}
