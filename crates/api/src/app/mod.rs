//! HTTP job gateway wiring (Axum router + service wiring).
//!
//! - `services.rs`: job subsystem wiring (store, queue, processor, lifecycle)
//! - `routes/`: HTTP routes + handlers (one file per job category)
//! - `dto.rs`: request/response DTOs and JSON mapping helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use chrono::Utc;
use tower::ServiceBuilder;

use quillerp_jobs::JobServiceConfig;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
///
/// Spawns the worker thread, which stops when the services it belongs to are
/// dropped, and the expiry sweep task, which runs until its runtime shuts
/// down.
pub async fn build_app(jwt_secret: String, config: JobServiceConfig) -> Router {
    let jwt = Arc::new(quillerp_auth::Hs256JwtValidator::new(
        jwt_secret.into_bytes(),
    ));
    let auth_state = middleware::AuthState { jwt };

    let sweep_interval = config.sweep_interval;
    let services = Arc::new(services::build_services(config));

    let lifecycle = services.lifecycle.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        loop {
            ticker.tick().await;
            lifecycle.sweep(Utc::now());
        }
    });

    // Protected routes: require auth + tenant context.
    let protected = routes::router()
        .layer(Extension(services))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::auth_middleware,
        ));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected)
        .layer(ServiceBuilder::new())
}
