//! Application API Handlers

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use kibaship_core::domain::application::Application;
use kibaship_core::dto::admission::CreateApplication;

use crate::api::error::{ApiError, ApiResult};
use crate::controller::Context;
use crate::service::admission;

/// POST /api/applications
pub async fn create_application(
    State(ctx): State<Context>,
    Json(req): Json<CreateApplication>,
) -> ApiResult<(StatusCode, Json<Application>)> {
    tracing::info!("Creating application: {}/{}", req.namespace, req.name);

    let app = admission::create_application(&ctx.store, req).await?;
    Ok((StatusCode::CREATED, Json(app)))
}

/// GET /api/applications/{namespace}/{name}
pub async fn get_application(
    State(ctx): State<Context>,
    Path((namespace, name)): Path<(String, String)>,
) -> ApiResult<Json<Application>> {
    tracing::debug!("Getting application: {}/{}", namespace, name);

    ctx.store
        .get(&namespace, &name)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Application {}/{} not found", namespace, name)))
}
