use axum::{
    extract::{Extension, Path, Query},
    routing::{get, post},
    Json, Router,
};

use quillerp_jobs::{JobCategory, JobParams};

use crate::app::routes::common::{self, Services};
use crate::app::{dto, errors};
use crate::context::{PrincipalContext, TenantContext};

const RESOURCE: &str = "bulk_operations";

/// Bulk operations have no artifact, so there is no download route.
pub fn router() -> Router {
    Router::new()
        .route("/", post(create_bulk).get(list_bulk))
        .route("/stats", get(bulk_stats))
        .route("/:id", get(get_bulk).delete(delete_bulk))
        .route("/:id/cancel", post(cancel_bulk))
}

pub async fn create_bulk(
    Extension(services): Services,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreateBulkRequest>,
) -> axum::response::Response {
    if let Err(resp) = common::require(&tenant, &principal, RESOURCE, "create") {
        return resp;
    }

    match services.submit(
        tenant.tenant_id(),
        principal.principal_id(),
        JobParams::BulkOperation(dto::bulk_params(body)),
    ) {
        Ok((job, estimate)) => common::accepted(&job, &estimate),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn list_bulk(
    Extension(services): Services,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<dto::ListQuery>,
) -> axum::response::Response {
    common::list_jobs(
        &services,
        &tenant,
        &principal,
        RESOURCE,
        JobCategory::BulkOperation,
        query,
    )
}

pub async fn bulk_stats(
    Extension(services): Services,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    common::category_stats(
        &services,
        &tenant,
        &principal,
        RESOURCE,
        JobCategory::BulkOperation,
    )
}

pub async fn get_bulk(
    Extension(services): Services,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    common::get_job(&services, &tenant, &principal, RESOURCE, &id)
}

pub async fn cancel_bulk(
    Extension(services): Services,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    common::cancel_job(&services, &tenant, &principal, RESOURCE, &id)
}

pub async fn delete_bulk(
    Extension(services): Services,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    common::delete_job(&services, &tenant, &principal, RESOURCE, &id)
}
