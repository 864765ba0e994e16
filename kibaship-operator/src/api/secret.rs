//! Application Secret API Handlers

use axum::{Json, extract::State};
use kibaship_core::dto::admission::PutApplicationSecret;
use serde_json::{Value, json};

use crate::api::error::ApiResult;
use crate::controller::Context;
use crate::service::admission;

/// POST /api/secrets
/// Stores the application's environment; values are never echoed back
pub async fn put_application_secret(
    State(ctx): State<Context>,
    Json(req): Json<PutApplicationSecret>,
) -> ApiResult<Json<Value>> {
    tracing::info!("Storing secret for application {}/{}", req.namespace, req.application);

    let secret = admission::put_application_secret(&ctx.store, req).await?;
    let keys: Vec<&String> = secret.data.keys().collect();

    Ok(Json(json!({
        "namespace": secret.metadata.namespace,
        "name": secret.metadata.name,
        "keys": keys,
    })))
}
