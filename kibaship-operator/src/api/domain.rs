//! Application Domain API Handlers

use axum::{Json, extract::State, http::StatusCode};
use kibaship_core::domain::domain::ApplicationDomain;
use kibaship_core::dto::admission::CreateDomain;

use crate::api::error::ApiResult;
use crate::controller::Context;
use crate::service::admission;

/// POST /api/domains
pub async fn create_domain(
    State(ctx): State<Context>,
    Json(req): Json<CreateDomain>,
) -> ApiResult<(StatusCode, Json<ApplicationDomain>)> {
    tracing::info!(
        "Registering domain {} for application {} (default: {})",
        req.domain,
        req.application,
        req.default
    );

    let domain = admission::create_domain(&ctx.store, &ctx.config, req).await?;
    Ok((StatusCode::CREATED, Json(domain)))
}
