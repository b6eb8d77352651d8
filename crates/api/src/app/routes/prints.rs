use axum::{
    extract::{Extension, Path, Query},
    routing::{get, post},
    Json, Router,
};

use quillerp_jobs::{JobCategory, JobParams};

use crate::app::routes::common::{self, Services};
use crate::app::{dto, errors};
use crate::context::{PrincipalContext, TenantContext};

const RESOURCE: &str = "prints";

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_print).get(list_prints))
        .route("/stats", get(print_stats))
        .route("/:id", get(get_print).delete(delete_print))
        .route("/:id/cancel", post(cancel_print))
        .route("/:id/download", get(download_print))
}

pub async fn create_print(
    Extension(services): Services,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreatePrintRequest>,
) -> axum::response::Response {
    if let Err(resp) = common::require(&tenant, &principal, RESOURCE, "create") {
        return resp;
    }
    let params = match dto::print_params(body) {
        Ok(params) => params,
        Err(resp) => return resp,
    };

    match services.submit(
        tenant.tenant_id(),
        principal.principal_id(),
        JobParams::Print(params),
    ) {
        Ok((job, estimate)) => common::accepted(&job, &estimate),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn list_prints(
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
        JobCategory::Print,
        query,
    )
}

pub async fn print_stats(
    Extension(services): Services,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    common::category_stats(&services, &tenant, &principal, RESOURCE, JobCategory::Print)
}

pub async fn get_print(
    Extension(services): Services,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    common::get_job(&services, &tenant, &principal, RESOURCE, &id)
}

pub async fn cancel_print(
    Extension(services): Services,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    common::cancel_job(&services, &tenant, &principal, RESOURCE, &id)
}

pub async fn download_print(
    Extension(services): Services,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    common::download_job(&services, &tenant, &principal, RESOURCE, &id).await
}

pub async fn delete_print(
    Extension(services): Services,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    common::delete_job(&services, &tenant, &principal, RESOURCE, &id)
}
