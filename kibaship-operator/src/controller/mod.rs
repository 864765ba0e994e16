//! Controllers
//!
//! Four reconcilers share one store and one notifier:
//! - build trigger: once per deployment generation, creates the build objects
//! - progress: once per condition change, derives and persists the phase
//! - pipeline-run watcher: mirrors a run's verdict onto its deployment
//! - workload watcher: derives workload readiness onto its deployment

pub mod build_trigger;
pub mod pipeline_run_watcher;
pub mod progress;
pub mod workload_watcher;

use kibaship_core::domain::application::Application;
use kibaship_core::domain::deployment::Deployment;
use kibaship_core::domain::meta::{Kind, ObjectKey, Resource};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{ReconcileError, Result};
use crate::notifier::Notifier;
use crate::runtime::Controller;
use crate::store::{Store, WatchEvent};

/// Shared dependencies handed to every reconciler
#[derive(Clone)]
pub struct Context {
    pub store: Store,
    pub config: Arc<Config>,
    /// Reconciles can be dropped at any await point, so the operator wires
    /// an [`Outbox`](crate::notifier::Outbox) here and delivery happens off
    /// the reconcile path
    pub notifier: Arc<dyn Notifier>,
}

impl Context {
    pub fn new(store: Store, config: Config, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            config: Arc::new(config),
            notifier,
        }
    }

    /// The application a deployment belongs to
    pub async fn application_of(&self, deployment: &Deployment) -> Result<Application> {
        let name = &deployment.spec.application_ref.name;
        self.store
            .get(&deployment.metadata.namespace, name)
            .await?
            .ok_or_else(|| ReconcileError::not_ready(format!("application {}", name)))
    }

    /// Keys of every stored object of kind `T`
    pub async fn all_keys<T: Resource>(&self) -> Result<Vec<ObjectKey>> {
        let objects: Vec<T> = self.store.list(None, &Default::default()).await?;
        Ok(objects.iter().map(|o| o.meta().key()).collect())
    }
}

/// Keys the event's own object when it is of `kind` and `filter` accepts it
pub(crate) fn own_key(
    event: &WatchEvent,
    kind: Kind,
    filter: impl Fn(&WatchEvent) -> bool,
) -> Vec<ObjectKey> {
    if event.kind != kind || !filter(event) {
        return Vec::new();
    }
    event.key().into_iter().collect()
}

/// Starts every controller; each stops when `shutdown` is cancelled
pub fn spawn_all(ctx: &Context, shutdown: &CancellationToken) -> Vec<JoinHandle<()>> {
    let controllers: [Controller; 4] = [
        build_trigger::controller(ctx.clone()),
        progress::controller(ctx.clone()),
        pipeline_run_watcher::controller(ctx.clone()),
        workload_watcher::controller(ctx.clone()),
    ];

    controllers
        .into_iter()
        .map(|c| tokio::spawn(c.run(ctx.store.clone(), shutdown.clone())))
        .collect()
}
