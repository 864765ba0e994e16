//! Pipeline-run watcher
//!
//! Copies a run's `Succeeded` condition onto its deployment as
//! `PipelineRunReady`. Runs from an older generation are ignored.

use async_trait::async_trait;
use kibaship_core::domain::condition::{Condition, PIPELINE_RUN_READY, set_condition};
use kibaship_core::domain::deployment::Deployment;
use kibaship_core::domain::meta::{Kind, ObjectKey};
use kibaship_core::domain::pipeline::PipelineRun;
use kibaship_core::{labels, naming};
use std::sync::Arc;
use tracing::{debug, info};

use super::{Context, own_key};
use crate::error::Result;
use crate::runtime::predicate::not_deleted;
use crate::runtime::{Action, Controller, Reconciler};

pub struct PipelineRunWatcher {
    ctx: Context,
}

pub fn controller(ctx: Context) -> Controller {
    let config = Arc::clone(&ctx.config);
    Controller::new(Arc::new(PipelineRunWatcher { ctx }))
        .watches(|event| own_key(event, Kind::PipelineRun, not_deleted))
        .concurrency(config.watcher_concurrency)
        .timeout(config.reconcile_timeout)
}

/// Name of the deployment a run was created for
fn deployment_name(run: &PipelineRun) -> Option<&str> {
    run.metadata
        .controller_owner()
        .filter(|o| o.kind == Kind::Deployment)
        .map(|o| o.name.as_str())
        .or_else(|| run.metadata.label(labels::DEPLOYMENT_NAME))
}

#[async_trait]
impl Reconciler for PipelineRunWatcher {
    fn name(&self) -> &'static str {
        "pipeline-run-watcher"
    }

    async fn reconcile(&self, key: &ObjectKey) -> Result<Action> {
        let store = &self.ctx.store;
        let Some(run) = store.get::<PipelineRun>(&key.namespace, &key.name).await? else {
            return Ok(Action::Done);
        };
        let Some(succeeded) = run.succeeded_condition() else {
            return Ok(Action::Done);
        };
        let Some(name) = deployment_name(&run) else {
            debug!("Pipeline run {} has no deployment", key);
            return Ok(Action::Done);
        };
        let Some(mut deployment) = store.get::<Deployment>(&key.namespace, name).await? else {
            return Ok(Action::Done);
        };

        let current = naming::pipeline_run_name(deployment.spec.uuid, deployment.metadata.generation);
        if run.metadata.name != current {
            debug!("Pipeline run {} is stale, deployment builds {}", key, current);
            return Ok(Action::Done);
        }

        let changed = set_condition(
            &mut deployment.status.conditions,
            Condition::new(
                PIPELINE_RUN_READY,
                succeeded.status,
                succeeded.reason.clone(),
                succeeded.message.clone(),
            ),
        );
        if changed {
            store.update(&deployment).await?;
            info!(
                "Deployment {} {} is {} ({})",
                deployment.metadata.name, PIPELINE_RUN_READY, succeeded.status, succeeded.reason
            );
        }
        Ok(Action::Done)
    }

    async fn resync(&self) -> Result<Vec<ObjectKey>> {
        self.ctx.all_keys::<PipelineRun>().await
    }
}
