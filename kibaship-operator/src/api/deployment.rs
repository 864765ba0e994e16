//! Deployment API Handlers

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use kibaship_core::domain::deployment::Deployment;
use kibaship_core::dto::admission::CreateDeployment;

use crate::api::error::{ApiError, ApiResult};
use crate::controller::Context;
use crate::service::admission;

/// POST /api/deployments
pub async fn create_deployment(
    State(ctx): State<Context>,
    Json(req): Json<CreateDeployment>,
) -> ApiResult<(StatusCode, Json<Deployment>)> {
    tracing::info!(
        "Creating deployment {}/{} of application {}",
        req.namespace,
        req.name,
        req.application
    );

    let deployment = admission::create_deployment(&ctx.store, req).await?;
    Ok((StatusCode::CREATED, Json(deployment)))
}

/// GET /api/deployments/{namespace}/{name}
/// Includes the current phase and conditions
pub async fn get_deployment(
    State(ctx): State<Context>,
    Path((namespace, name)): Path<(String, String)>,
) -> ApiResult<Json<Deployment>> {
    tracing::debug!("Getting deployment: {}/{}", namespace, name);

    ctx.store
        .get(&namespace, &name)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Deployment {}/{} not found", namespace, name)))
}

/// DELETE /api/deployments/{namespace}/{name}
/// Removes the deployment and everything created for it
pub async fn delete_deployment(
    State(ctx): State<Context>,
    Path((namespace, name)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    tracing::info!("Deleting deployment: {}/{}", namespace, name);

    if !ctx.store.delete::<Deployment>(&namespace, &name).await? {
        return Err(ApiError::NotFound(format!(
            "Deployment {}/{} not found",
            namespace, name
        )));
    }
    Ok(StatusCode::NO_CONTENT)
}
