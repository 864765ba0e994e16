//! Build Trigger Controller
//!
//! Runs once per deployment generation. Git deployments get their pipeline,
//! one pipeline run for the generation and a frozen copy of the application
//! secret. Registry deployments have nothing to build and are materialized
//! directly.

use async_trait::async_trait;
use kibaship_core::domain::application::{Application, ApplicationSource, GitRepositoryConfig};
use kibaship_core::domain::deployment::Deployment;
use kibaship_core::domain::meta::{Kind, ObjectKey, ObjectMeta, OwnerReference};
use kibaship_core::domain::pipeline::PipelineRun;
use kibaship_core::domain::secret::Secret;
use kibaship_core::{labels, naming, template};
use std::sync::Arc;
use tracing::{debug, info};

use super::{Context, own_key};
use crate::error::{ReconcileError, Result};
use crate::runtime::predicate::{controller_owner_key, generation_changed, not_deleted};
use crate::runtime::{Action, Controller, Reconciler};
use crate::service::lifecycle::{notify_pipeline_run, pipeline_run_change, record_pipeline_run};
use crate::service::materialize::materialize;
use crate::service::{ensure, owner_of};

pub struct BuildTrigger {
    ctx: Context,
}

pub fn controller(ctx: Context) -> Controller {
    let config = Arc::clone(&ctx.config);
    Controller::new(Arc::new(BuildTrigger { ctx }))
        .watches(|event| own_key(event, Kind::Deployment, generation_changed))
        // Run status changes feed the pipeline-run notifications
        .watches(|event| {
            if event.kind != Kind::PipelineRun || !not_deleted(event) {
                return Vec::new();
            }
            controller_owner_key(event, Kind::Deployment).into_iter().collect()
        })
        .concurrency(config.build_concurrency)
        .timeout(config.reconcile_timeout)
        .requeue_delay(config.dependency_requeue)
}

#[async_trait]
impl Reconciler for BuildTrigger {
    fn name(&self) -> &'static str {
        "build-trigger"
    }

    async fn reconcile(&self, key: &ObjectKey) -> Result<Action> {
        let Some(deployment) = self.ctx.store.get::<Deployment>(&key.namespace, &key.name).await? else {
            debug!("Deployment {} is gone", key);
            return Ok(Action::Done);
        };
        let app = self.ctx.application_of(&deployment).await?;

        match &app.spec.source {
            ApplicationSource::GitRepository(git) => self.build(deployment, &app, git).await,
            ApplicationSource::ImageFromRegistry(_) => self.rollout(deployment, &app).await,
            ApplicationSource::Database(db) => {
                debug!(
                    "Deployment {} targets a {} database, nothing to build",
                    key, db.engine
                );
                Ok(Action::Done)
            }
        }
    }

    async fn resync(&self) -> Result<Vec<ObjectKey>> {
        self.ctx.all_keys::<Deployment>().await
    }
}

impl BuildTrigger {
    async fn build(&self, deployment: Deployment, app: &Application, git: &GitRepositoryConfig) -> Result<Action> {
        let store = &self.ctx.store;
        let Some(source) = &deployment.spec.git_repository else {
            return Err(ReconcileError::config(format!(
                "deployment {} has no gitRepository config for a GitRepository application",
                deployment.metadata.key()
            )));
        };
        let owner = owner_of(&deployment)?;

        ensure(store, &template::pipeline_for(&deployment, git, Some(owner.clone()))).await?;

        let desired_run = template::pipeline_run_for(
            &deployment,
            git,
            &source.commit_sha,
            source.branch.as_deref(),
            Some(owner.clone()),
        );
        if ensure(store, &desired_run).await? {
            info!(
                "Triggered build {} for deployment {} at {}",
                desired_run.metadata.name, deployment.metadata.name, source.commit_sha
            );
        }

        let secret_ready = self.mirror_secret(&deployment, app, owner).await?;

        let run: PipelineRun = store
            .fetch(&deployment.metadata.namespace, &desired_run.metadata.name)
            .await?;
        self.record_progress(deployment, &run).await?;

        Ok(self.after_secret(secret_ready))
    }

    async fn rollout(&self, deployment: Deployment, app: &Application) -> Result<Action> {
        if deployment.spec.image_from_registry.is_none() {
            return Err(ReconcileError::config(format!(
                "deployment {} has no imageFromRegistry config for an ImageFromRegistry application",
                deployment.metadata.key()
            )));
        }
        materialize(&self.ctx.store, &self.ctx.config, &deployment, app).await?;

        let owner = owner_of(&deployment)?;
        let secret_ready = self.mirror_secret(&deployment, app, owner).await?;
        self.observe_generation(deployment).await?;

        Ok(self.after_secret(secret_ready))
    }

    /// Checks back later while the application secret is missing
    fn after_secret(&self, secret_ready: bool) -> Action {
        if secret_ready {
            Action::Done
        } else {
            Action::RequeueAfter(self.ctx.config.dependency_requeue)
        }
    }

    /// Freezes the application secret for this deployment
    ///
    /// Returns `false` while the application secret does not exist.
    async fn mirror_secret(&self, deployment: &Deployment, app: &Application, owner: OwnerReference) -> Result<bool> {
        let store = &self.ctx.store;
        let namespace = &deployment.metadata.namespace;
        let name = naming::deployment_secret_name(deployment.spec.uuid);

        if store.get::<Secret>(namespace, &name).await?.is_some() {
            return Ok(true);
        }

        let upstream_name = naming::application_secret_name(app.spec.uuid);
        let Some(upstream) = store.get::<Secret>(namespace, &upstream_name).await? else {
            debug!(
                "Secret {} not available yet for deployment {}",
                upstream_name, deployment.metadata.name
            );
            return Ok(false);
        };

        let spec = &deployment.spec;
        let secret = Secret {
            metadata: ObjectMeta::new(namespace, &name)
                .with_labels(labels::for_component(
                    spec.project_uuid,
                    spec.application_uuid,
                    spec.uuid,
                    &name,
                    "environment",
                ))
                .with_owner(owner),
            data: upstream.data,
        };
        ensure(store, &secret).await?;
        Ok(true)
    }

    /// Reports the run's status once and marks the generation observed
    async fn record_progress(&self, mut deployment: Deployment, run: &PipelineRun) -> Result<()> {
        let change = pipeline_run_change(&deployment, run);
        if let Some(change) = &change {
            record_pipeline_run(&mut deployment, change);
        }

        let generation = deployment.metadata.generation;
        if change.is_none() && deployment.status.observed_generation == generation {
            return Ok(());
        }
        deployment.status.observed_generation = generation;
        let deployment = self.ctx.store.update(&deployment).await?;

        // Notify only once the bookkeeping is persisted
        if let Some(change) = change {
            notify_pipeline_run(&*self.ctx.notifier, &deployment, &change).await;
        }
        Ok(())
    }

    async fn observe_generation(&self, mut deployment: Deployment) -> Result<()> {
        let generation = deployment.metadata.generation;
        if deployment.status.observed_generation == generation {
            return Ok(());
        }
        deployment.status.observed_generation = generation;
        self.ctx.store.update(&deployment).await?;
        Ok(())
    }
}
