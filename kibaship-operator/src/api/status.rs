//! Status Report API Handlers
//!
//! Entry points for the build system and the runtime to report what they
//! observe. The watchers turn these into deployment conditions.

use axum::{
    Json,
    extract::{Path, State},
};
use kibaship_core::domain::pipeline::PipelineRun;
use kibaship_core::domain::workload::{Workload, WorkloadStatus};
use kibaship_core::dto::status::PipelineRunReport;

use crate::api::error::ApiResult;
use crate::controller::Context;
use crate::service::admission;

/// PUT /api/pipeline-runs/{namespace}/{name}/status
pub async fn report_pipeline_run(
    State(ctx): State<Context>,
    Path((namespace, name)): Path<(String, String)>,
    Json(report): Json<PipelineRunReport>,
) -> ApiResult<Json<PipelineRun>> {
    tracing::debug!(
        "Pipeline run {}/{} reported {} ({})",
        namespace,
        name,
        report.status,
        report.reason
    );

    let run = admission::report_pipeline_run(&ctx.store, &namespace, &name, report).await?;
    Ok(Json(run))
}

/// PUT /api/workloads/{namespace}/{name}/status
pub async fn report_workload(
    State(ctx): State<Context>,
    Path((namespace, name)): Path<(String, String)>,
    Json(status): Json<WorkloadStatus>,
) -> ApiResult<Json<Workload>> {
    tracing::debug!(
        "Workload {}/{} reported {}/{} ready",
        namespace,
        name,
        status.ready_replicas,
        status.replicas
    );

    let workload = admission::report_workload(&ctx.store, &namespace, &name, status).await?;
    Ok(Json(workload))
}
