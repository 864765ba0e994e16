//! Workload watcher
//!
//! Derives `K8sDeploymentReady` from the observed workload status and writes
//! it onto the owning deployment.

use async_trait::async_trait;
use kibaship_core::domain::condition::{Condition, ConditionStatus, K8S_DEPLOYMENT_READY, reasons, set_condition};
use kibaship_core::domain::deployment::Deployment;
use kibaship_core::domain::meta::{Kind, ObjectKey};
use kibaship_core::domain::workload::{Workload, WorkloadStatus};
use std::sync::Arc;
use tracing::info;

use super::{Context, own_key};
use crate::error::Result;
use crate::runtime::predicate::not_deleted;
use crate::runtime::{Action, Controller, Reconciler};

/// Restarts after which a container counts as crash looping
const CRASH_LOOP_RESTARTS: u32 = 3;

pub struct WorkloadWatcher {
    ctx: Context,
}

pub fn controller(ctx: Context) -> Controller {
    let config = Arc::clone(&ctx.config);
    Controller::new(Arc::new(WorkloadWatcher { ctx }))
        .watches(|event| own_key(event, Kind::Workload, not_deleted))
        .concurrency(config.watcher_concurrency)
        .timeout(config.reconcile_timeout)
}

/// Readiness condition for a workload status
pub fn readiness(status: &WorkloadStatus) -> Condition {
    let crash_looping = status.container_statuses.iter().find(|c| {
        c.restart_count >= CRASH_LOOP_RESTARTS
            || c.waiting_reason.as_deref() == Some(reasons::CRASH_LOOP_BACK_OFF)
    });

    if let Some(container) = crash_looping {
        return Condition::new(
            K8S_DEPLOYMENT_READY,
            ConditionStatus::False,
            reasons::CRASH_LOOP_BACK_OFF,
            format!(
                "container {} is crash looping ({} restarts)",
                container.name, container.restart_count
            ),
        );
    }

    let replicas = format!("{}/{} replicas ready", status.ready_replicas, status.replicas);
    if status.ready_replicas > 0 {
        Condition::new(K8S_DEPLOYMENT_READY, ConditionStatus::True, reasons::PODS_READY, replicas)
    } else if status.unavailable_replicas > 0 {
        Condition::new(K8S_DEPLOYMENT_READY, ConditionStatus::False, reasons::PODS_NOT_READY, replicas)
    } else {
        Condition::new(K8S_DEPLOYMENT_READY, ConditionStatus::Unknown, reasons::DEPLOYING, replicas)
    }
}

#[async_trait]
impl Reconciler for WorkloadWatcher {
    fn name(&self) -> &'static str {
        "workload-watcher"
    }

    async fn reconcile(&self, key: &ObjectKey) -> Result<Action> {
        let store = &self.ctx.store;
        let Some(workload) = store.get::<Workload>(&key.namespace, &key.name).await? else {
            return Ok(Action::Done);
        };
        let Some(owner) = workload
            .metadata
            .controller_owner()
            .filter(|o| o.kind == Kind::Deployment)
        else {
            return Ok(Action::Done);
        };
        let Some(mut deployment) = store.get::<Deployment>(&key.namespace, &owner.name).await? else {
            return Ok(Action::Done);
        };

        let condition = readiness(&workload.status);
        let (status, reason) = (condition.status, condition.reason.clone());
        if set_condition(&mut deployment.status.conditions, condition) {
            store.update(&deployment).await?;
            info!(
                "Deployment {} {} is {} ({})",
                deployment.metadata.name, K8S_DEPLOYMENT_READY, status, reason
            );
        }
        Ok(Action::Done)
    }

    async fn resync(&self) -> Result<Vec<ObjectKey>> {
        self.ctx.all_keys::<Workload>().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::NoopNotifier;
    use crate::service::materialize::materialize;
    use crate::testing::{self, NS};
    use kibaship_core::domain::condition::find_condition;
    use kibaship_core::domain::workload::ContainerStatus;
    use kibaship_core::naming;

    fn container(restarts: u32, waiting: Option<&str>) -> ContainerStatus {
        ContainerStatus {
            name: "app".into(),
            restart_count: restarts,
            waiting_reason: waiting.map(str::to_string),
        }
    }

    #[test]
    fn test_readiness_rules() {
        let ready = WorkloadStatus {
            replicas: 1,
            ready_replicas: 1,
            ..Default::default()
        };
        assert_eq!(readiness(&ready).reason, reasons::PODS_READY);
        assert_eq!(readiness(&ready).status, ConditionStatus::True);

        let unavailable = WorkloadStatus {
            replicas: 1,
            unavailable_replicas: 1,
            ..Default::default()
        };
        assert_eq!(readiness(&unavailable).reason, reasons::PODS_NOT_READY);
        assert_eq!(readiness(&unavailable).status, ConditionStatus::False);

        assert_eq!(readiness(&WorkloadStatus::default()).status, ConditionStatus::Unknown);
    }

    #[test]
    fn test_crash_loop_wins_over_ready_pods() {
        let restarting = WorkloadStatus {
            replicas: 1,
            ready_replicas: 1,
            container_statuses: vec![container(3, None)],
            ..Default::default()
        };
        assert_eq!(readiness(&restarting).reason, reasons::CRASH_LOOP_BACK_OFF);

        let waiting = WorkloadStatus {
            replicas: 1,
            container_statuses: vec![container(0, Some("CrashLoopBackOff"))],
            ..Default::default()
        };
        assert_eq!(readiness(&waiting).status, ConditionStatus::False);

        let few_restarts = WorkloadStatus {
            replicas: 1,
            ready_replicas: 1,
            container_statuses: vec![container(2, None)],
            ..Default::default()
        };
        assert_eq!(readiness(&few_restarts).reason, reasons::PODS_READY);
    }

    #[tokio::test]
    async fn test_readiness_written_to_owner() {
        let ctx = Context::new(testing::store(), testing::config(), Arc::new(NoopNotifier));
        let app = ctx.store.create(&testing::registry_app("web", None)).await.unwrap();
        let deployment = ctx.store.create(&testing::deployment("web-1", &app)).await.unwrap();
        materialize(&ctx.store, &ctx.config, &deployment, &app).await.unwrap();

        let name = naming::workload_name(deployment.spec.uuid);
        let mut workload: Workload = ctx.store.fetch(NS, &name).await.unwrap();
        workload.status.replicas = 1;
        workload.status.unavailable_replicas = 1;
        ctx.store.update(&workload).await.unwrap();

        let watcher = WorkloadWatcher { ctx };
        watcher.reconcile(&ObjectKey::new(NS, &name)).await.unwrap();
        watcher.reconcile(&ObjectKey::new(NS, &name)).await.unwrap();

        let deployment: Deployment = watcher.ctx.store.fetch(NS, "web-1").await.unwrap();
        let ready = find_condition(&deployment.status.conditions, K8S_DEPLOYMENT_READY).unwrap();
        assert_eq!(ready.status, ConditionStatus::False);
        assert_eq!(ready.reason, reasons::PODS_NOT_READY);
        // one write for the condition, none for the repeat
        assert_eq!(deployment.metadata.resource_version, 2);
    }
}
