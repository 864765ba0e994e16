//! Progress Controller
//!
//! Derives a deployment's phase from its conditions, runs the side effect
//! of entering that phase and persists it. This is the only writer of
//! `status.phase`.

use async_trait::async_trait;
use kibaship_core::domain::deployment::{Deployment, DeploymentPhase};
use kibaship_core::domain::meta::{Kind, ObjectKey};
use kibaship_core::phase::compute_target_phase;
use std::sync::Arc;
use tracing::{debug, info};

use super::{Context, own_key};
use crate::error::Result;
use crate::runtime::predicate::{conditions_changed, generation_changed};
use crate::runtime::{Action, Controller, Reconciler};
use crate::service::lifecycle::notify_phase_change;
use crate::service::materialize::materialize;
use crate::service::promotion::promote;

pub struct Progress {
    ctx: Context,
}

pub fn controller(ctx: Context) -> Controller {
    let config = Arc::clone(&ctx.config);
    Controller::new(Arc::new(Progress { ctx }))
        .watches(|event| {
            own_key(event, Kind::Deployment, |e| generation_changed(e) || conditions_changed(e))
        })
        .concurrency(config.progress_concurrency)
        .timeout(config.reconcile_timeout)
        .requeue_delay(config.dependency_requeue)
}

#[async_trait]
impl Reconciler for Progress {
    fn name(&self) -> &'static str {
        "progress"
    }

    async fn reconcile(&self, key: &ObjectKey) -> Result<Action> {
        let store = &self.ctx.store;
        let Some(deployment) = store.get::<Deployment>(&key.namespace, &key.name).await? else {
            return Ok(Action::Done);
        };
        let app = self.ctx.application_of(&deployment).await?;

        let previous = deployment.phase();
        let target = compute_target_phase(&app.spec.source, &deployment.status.conditions);
        if previous == target {
            debug!("Deployment {} stays {}", key, previous);
            return Ok(Action::Done);
        }

        // Side effects first: a failed write leaves the old phase for the retry
        match target {
            DeploymentPhase::Deploying => {
                materialize(store, &self.ctx.config, &deployment, &app).await?;
            }
            DeploymentPhase::Succeeded => {
                let outcome = promote(store, &deployment, &app).await?;
                debug!("Promotion of {}: {:?}", key, outcome);
            }
            DeploymentPhase::Initializing | DeploymentPhase::Building | DeploymentPhase::Failed => {}
        }

        let mut updated = deployment;
        updated.status.phase = target;
        let updated = store.update(&updated).await?;
        info!("Deployment {} phase {} -> {}", key, previous, target);

        notify_phase_change(&*self.ctx.notifier, &updated, previous, target).await;
        Ok(Action::Done)
    }

    async fn resync(&self) -> Result<Vec<ObjectKey>> {
        self.ctx.all_keys::<Deployment>().await
    }
}
