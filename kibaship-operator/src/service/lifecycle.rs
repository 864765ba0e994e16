//! Lifecycle notifications
//!
//! Phase transitions and pipeline-run status changes become events for the
//! notification sink. Pipeline-run changes are deduplicated against the
//! last reported (status, generation) pair kept in deployment annotations.

use kibaship_core::domain::deployment::{Deployment, DeploymentPhase};
use kibaship_core::domain::pipeline::PipelineRun;
use kibaship_core::dto::event::{DeploymentEvent, PipelineRunRef};
use kibaship_core::labels;
use tracing::debug;

use crate::notifier::{Notifier, deliver};

/// Emits `deployment.status.changed` when the phase actually changed
///
/// Returns whether an event was sent.
pub async fn notify_phase_change(
    notifier: &dyn Notifier,
    deployment: &Deployment,
    previous: DeploymentPhase,
    new: DeploymentPhase,
) -> bool {
    if previous == new {
        return false;
    }

    debug!(
        "Deployment {} phase {} -> {}",
        deployment.metadata.name, previous, new
    );
    let event = DeploymentEvent::phase_changed(deployment, previous.as_str(), new.as_str());
    deliver(notifier, &event).await;
    true
}

/// Pipeline-run status not yet reported for a deployment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineRunChange {
    pub previous_status: String,
    pub status: String,
    pub generation: String,
    pub reason: String,
    pub run_name: String,
}

/// Compares the run's `Succeeded` condition against the recorded pair
///
/// `run` is the run of the deployment's current generation, so the pair is
/// keyed by the deployment generation: a new generation's first status is
/// always reported, even when it equals the last status of the previous run.
pub fn pipeline_run_change(deployment: &Deployment, run: &PipelineRun) -> Option<PipelineRunChange> {
    let condition = run.succeeded_condition()?;
    let status = condition.status.to_string();
    let generation = deployment.metadata.generation.to_string();

    let meta = &deployment.metadata;
    let last_status = meta.annotation(labels::LAST_PIPELINERUN_STATUS).unwrap_or_default();
    let last_generation = meta
        .annotation(labels::LAST_PIPELINERUN_GENERATION)
        .unwrap_or_default();

    if status == last_status && generation == last_generation {
        return None;
    }

    Some(PipelineRunChange {
        previous_status: last_status.to_string(),
        status,
        generation,
        reason: condition.reason.clone(),
        run_name: run.metadata.name.clone(),
    })
}

/// Stores the reported pair on the deployment's annotations
pub fn record_pipeline_run(deployment: &mut Deployment, change: &PipelineRunChange) {
    let annotations = &mut deployment.metadata.annotations;
    annotations.insert(labels::LAST_PIPELINERUN_STATUS.to_string(), change.status.clone());
    annotations.insert(
        labels::LAST_PIPELINERUN_GENERATION.to_string(),
        change.generation.clone(),
    );
}

pub async fn notify_pipeline_run(
    notifier: &dyn Notifier,
    deployment: &Deployment,
    change: &PipelineRunChange,
) {
    let event = DeploymentEvent::pipeline_run_changed(
        deployment,
        &change.previous_status,
        PipelineRunRef {
            name: change.run_name.clone(),
            status: change.status.clone(),
            reason: change.reason.clone(),
        },
    );
    deliver(notifier, &event).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::testing::RecordingNotifier;
    use crate::testing;
    use kibaship_core::domain::condition::{Condition, ConditionStatus, SUCCEEDED};
    use kibaship_core::dto::event::{DEPLOYMENT_STATUS_CHANGED, PIPELINERUN_STATUS_CHANGED};
    use kibaship_core::{naming, template};

    fn run_with(deployment: &Deployment, status: ConditionStatus) -> PipelineRun {
        let git = testing::git_source();
        let mut run = template::pipeline_run_for(deployment, &git, "0123abcd", None, None);
        run.status
            .conditions
            .push(Condition::new(SUCCEEDED, status, "Running", ""));
        run
    }

    #[tokio::test]
    async fn test_phase_change_suppressed_when_equal() {
        let notifier = RecordingNotifier::default();
        let deployment = testing::deployment("web-1", &testing::git_app("web"));

        assert!(
            !notify_phase_change(&notifier, &deployment, DeploymentPhase::Building, DeploymentPhase::Building).await
        );
        assert!(
            notify_phase_change(&notifier, &deployment, DeploymentPhase::Building, DeploymentPhase::Deploying).await
        );

        let events = notifier.events().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, DEPLOYMENT_STATUS_CHANGED);
        assert_eq!(events[0].previous_phase, "Building");
        assert_eq!(events[0].new_phase, "Deploying");
    }

    #[tokio::test]
    async fn test_pipeline_run_change_reported_once() {
        let notifier = RecordingNotifier::default();
        let mut deployment = testing::deployment("web-1", &testing::git_app("web"));
        let run = run_with(&deployment, ConditionStatus::Unknown);

        let change = pipeline_run_change(&deployment, &run).unwrap();
        assert_eq!(change.previous_status, "");
        assert_eq!(change.status, "Unknown");
        notify_pipeline_run(&notifier, &deployment, &change).await;
        record_pipeline_run(&mut deployment, &change);

        assert!(pipeline_run_change(&deployment, &run).is_none());

        let finished = run_with(&deployment, ConditionStatus::True);
        let change = pipeline_run_change(&deployment, &finished).unwrap();
        assert_eq!(change.previous_status, "Unknown");
        assert_eq!(change.status, "True");

        let events = notifier.events().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, PIPELINERUN_STATUS_CHANGED);
        assert_eq!(events[0].pipeline_run_ref.as_ref().unwrap().name, run.metadata.name);
    }

    #[test]
    fn test_new_generation_reported_with_same_status() {
        let mut deployment = testing::deployment("web-1", &testing::git_app("web"));
        deployment.metadata.generation = 1;
        let first = run_with(&deployment, ConditionStatus::True);
        let change = pipeline_run_change(&deployment, &first).unwrap();
        assert_eq!(change.generation, "1");
        record_pipeline_run(&mut deployment, &change);

        // Runs of different generations carry the same object generation
        deployment.metadata.generation = 2;
        let second = run_with(&deployment, ConditionStatus::True);
        assert_eq!(second.metadata.generation, first.metadata.generation);

        let change = pipeline_run_change(&deployment, &second).unwrap();
        assert_eq!(change.previous_status, "True");
        assert_eq!(change.generation, "2");
        assert_eq!(change.run_name, naming::pipeline_run_name(deployment.spec.uuid, 2));
    }

    #[test]
    fn test_run_without_condition_is_not_a_change() {
        let deployment = testing::deployment("web-1", &testing::git_app("web"));
        let mut run = run_with(&deployment, ConditionStatus::Unknown);
        run.status.conditions.clear();
        assert!(pipeline_run_change(&deployment, &run).is_none());
    }
}
