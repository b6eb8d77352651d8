use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use quillerp_auth::Permission;
use quillerp_core::TemplateId;

use crate::app::routes::common::Services;
use crate::app::{dto, errors};
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_template).get(list_templates))
        .route("/:id", get(get_template).put(update_template).delete(delete_template))
        .route("/:id/default", post(set_default_template))
}

fn require(
    tenant: &TenantContext,
    principal: &PrincipalContext,
    action: &str,
) -> Result<(), axum::response::Response> {
    crate::authz::require(tenant, principal, &Permission::for_action("templates", action))
        .map_err(errors::authz_error_to_response)
}

fn parse_template_id(raw: &str) -> Result<TemplateId, axum::response::Response> {
    raw.parse().map_err(|_| {
        errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid template id")
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateListQuery {
    pub doc_type: Option<String>,
}

pub async fn create_template(
    Extension(services): Services,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreateTemplateRequest>,
) -> axum::response::Response {
    if let Err(resp) = require(&tenant, &principal, "manage") {
        return resp;
    }

    match services.templates.create(tenant.tenant_id(), body.into()) {
        Ok(template) => {
            (StatusCode::CREATED, Json(dto::template_to_json(&template))).into_response()
        }
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn list_templates(
    Extension(services): Services,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<TemplateListQuery>,
) -> axum::response::Response {
    if let Err(resp) = require(&tenant, &principal, "read") {
        return resp;
    }

    let items: Vec<_> = services
        .templates
        .list(tenant.tenant_id(), query.doc_type.as_deref())
        .iter()
        .map(dto::template_to_json)
        .collect();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}

pub async fn get_template(
    Extension(services): Services,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = require(&tenant, &principal, "read") {
        return resp;
    }
    let id = match parse_template_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.templates.get(tenant.tenant_id(), id) {
        Ok(template) => (StatusCode::OK, Json(dto::template_to_json(&template))).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn update_template(
    Extension(services): Services,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateTemplateRequest>,
) -> axum::response::Response {
    if let Err(resp) = require(&tenant, &principal, "manage") {
        return resp;
    }
    let id = match parse_template_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.templates.update(tenant.tenant_id(), id, body.into()) {
        Ok(template) => (StatusCode::OK, Json(dto::template_to_json(&template))).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn set_default_template(
    Extension(services): Services,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = require(&tenant, &principal, "manage") {
        return resp;
    }
    let id = match parse_template_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.templates.set_default(tenant.tenant_id(), id) {
        Ok(template) => (StatusCode::OK, Json(dto::template_to_json(&template))).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn delete_template(
    Extension(services): Services,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = require(&tenant, &principal, "manage") {
        return resp;
    }
    let id = match parse_template_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.templates.delete(tenant.tenant_id(), id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}
