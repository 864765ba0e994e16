//! Deployment phase state machine
//!
//! Pure mapping from (application type, condition set) to the phase a
//! deployment should be in. Recomputing from the same inputs always yields
//! the same phase.

use crate::domain::application::ApplicationSource;
use crate::domain::condition::{
    Condition, ConditionStatus, K8S_DEPLOYMENT_READY, PIPELINE_RUN_READY, find_condition, reasons,
};
use crate::domain::deployment::DeploymentPhase;

/// Computes the target phase for a deployment
pub fn compute_target_phase(source: &ApplicationSource, conditions: &[Condition]) -> DeploymentPhase {
    match source {
        ApplicationSource::GitRepository(_) => git_repository_phase(conditions),
        ApplicationSource::ImageFromRegistry(_) => image_from_registry_phase(conditions),
        // Database workloads are not driven to completion yet
        ApplicationSource::Database(_) => DeploymentPhase::Initializing,
    }
}

fn git_repository_phase(conditions: &[Condition]) -> DeploymentPhase {
    let Some(pipeline_run) = find_condition(conditions, PIPELINE_RUN_READY) else {
        return DeploymentPhase::Initializing;
    };

    match pipeline_run.status {
        ConditionStatus::Unknown => DeploymentPhase::Building,
        ConditionStatus::False => DeploymentPhase::Failed,
        ConditionStatus::True => match find_condition(conditions, K8S_DEPLOYMENT_READY) {
            Some(ready) if is_crash_loop(ready) => DeploymentPhase::Failed,
            Some(ready) if ready.status == ConditionStatus::True => DeploymentPhase::Succeeded,
            _ => DeploymentPhase::Deploying,
        },
    }
}

fn image_from_registry_phase(conditions: &[Condition]) -> DeploymentPhase {
    let Some(ready) = find_condition(conditions, K8S_DEPLOYMENT_READY) else {
        return DeploymentPhase::Initializing;
    };

    if is_crash_loop(ready) {
        return DeploymentPhase::Failed;
    }

    match ready.status {
        ConditionStatus::True => DeploymentPhase::Succeeded,
        ConditionStatus::False if is_not_ready_yet(ready) => DeploymentPhase::Deploying,
        ConditionStatus::False => DeploymentPhase::Failed,
        ConditionStatus::Unknown => DeploymentPhase::Deploying,
    }
}

fn is_crash_loop(condition: &Condition) -> bool {
    condition.reason == reasons::CRASH_LOOP_BACK_OFF
}

fn is_not_ready_yet(condition: &Condition) -> bool {
    condition.reason == reasons::DEPLOYMENT_NOT_READY || condition.reason == reasons::PODS_NOT_READY
}
