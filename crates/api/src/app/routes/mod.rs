use axum::{
    routing::{get, post},
    Router,
};

pub mod bulk;
pub mod common;
pub mod exports;
pub mod prints;
pub mod system;
pub mod templates;

/// Router for all authenticated (tenant-scoped) endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .route("/jobs/stats", get(system::job_stats))
        .route("/admin/seed-demo", post(system::seed_demo))
        .nest("/exports", exports::router())
        .nest("/prints", prints::router())
        .nest("/bulk-operations", bulk::router())
        .nest("/templates", templates::router())
}
