//! API Module
//!
//! HTTP API layer for the operator: admission of user-facing resources and
//! status reports from the build system and the runtime.

pub mod application;
pub mod deployment;
pub mod domain;
pub mod error;
pub mod health;
pub mod secret;
pub mod status;

use axum::{
    Router,
    routing::{get, post, put},
};
use tower_http::trace::TraceLayer;

use crate::controller::Context;

/// Create the main API router with all endpoints
pub fn create_router(ctx: Context) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Admission endpoints
        .route("/api/applications", post(application::create_application))
        .route(
            "/api/applications/{namespace}/{name}",
            get(application::get_application),
        )
        .route("/api/deployments", post(deployment::create_deployment))
        .route(
            "/api/deployments/{namespace}/{name}",
            get(deployment::get_deployment).delete(deployment::delete_deployment),
        )
        .route("/api/domains", post(domain::create_domain))
        .route("/api/secrets", post(secret::put_application_secret))
        // Status reports
        .route(
            "/api/pipeline-runs/{namespace}/{name}/status",
            put(status::report_pipeline_run),
        )
        .route(
            "/api/workloads/{namespace}/{name}/status",
            put(status::report_workload),
        )
        // Add state and middleware
        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
}
