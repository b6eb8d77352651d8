use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use quillerp_auth::AuthzError;
use quillerp_core::DomainError;

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    match err {
        DomainError::Validation(violations) => (
            StatusCode::BAD_REQUEST,
            axum::Json(json!({
                "error": "validation_error",
                "message": "validation failed",
                "violations": violations,
            })),
        )
            .into_response(),
        DomainError::InvalidId(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_id", msg),
        DomainError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        DomainError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        DomainError::Unauthorized => {
            json_error(StatusCode::FORBIDDEN, "unauthorized", "unauthorized")
        }
        DomainError::Gone => json_error(
            StatusCode::GONE,
            "result_expired",
            "the result expired and has been removed",
        ),
        DomainError::NotReady => json_error(
            StatusCode::TOO_EARLY,
            "not_ready",
            "the job has not completed yet",
        ),
        DomainError::InvariantViolation(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", msg)
        }
    }
}

pub fn authz_error_to_response(err: AuthzError) -> axum::response::Response {
    json_error(StatusCode::FORBIDDEN, "forbidden", err.to_string())
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
