//! Lifecycle notification events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::deployment::Deployment;

pub const DEPLOYMENT_STATUS_CHANGED: &str = "deployment.status.changed";
pub const PIPELINERUN_STATUS_CHANGED: &str = "deployment.pipelinerun.status.changed";

/// Event delivered to the notification sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub previous_phase: String,
    pub new_phase: String,
    pub deployment_ref: DeploymentRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_run_ref: Option<PipelineRunRef>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRef {
    pub name: String,
    pub namespace: String,
    pub uuid: String,
    pub phase: String,
    pub slug: String,
}

impl DeploymentRef {
    pub fn from_deployment(deployment: &Deployment) -> Self {
        Self {
            name: deployment.metadata.name.clone(),
            namespace: deployment.metadata.namespace.clone(),
            uuid: deployment.spec.uuid.to_string(),
            phase: deployment.status.phase.to_string(),
            slug: deployment.spec.slug.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRunRef {
    pub name: String,
    pub status: String,
    pub reason: String,
}

impl DeploymentEvent {
    pub fn phase_changed(deployment: &Deployment, previous: &str, new: &str) -> Self {
        Self {
            event_type: DEPLOYMENT_STATUS_CHANGED.to_string(),
            previous_phase: previous.to_string(),
            new_phase: new.to_string(),
            deployment_ref: DeploymentRef::from_deployment(deployment),
            pipeline_run_ref: None,
            timestamp: Utc::now(),
        }
    }

    /// Pipeline-run status change; phases carry the run's previous and new status
    pub fn pipeline_run_changed(
        deployment: &Deployment,
        previous_status: &str,
        run: PipelineRunRef,
    ) -> Self {
        Self {
            event_type: PIPELINERUN_STATUS_CHANGED.to_string(),
            previous_phase: previous_status.to_string(),
            new_phase: run.status.clone(),
            deployment_ref: DeploymentRef::from_deployment(deployment),
            pipeline_run_ref: Some(run),
            timestamp: Utc::now(),
        }
    }
}
