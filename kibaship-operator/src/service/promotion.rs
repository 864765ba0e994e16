//! Promotion Policy
//!
//! Decides whether a succeeded deployment becomes the application's current
//! deployment and points the application-level routes at it.

use kibaship_core::domain::application::{Application, LocalObjectReference};
use kibaship_core::domain::deployment::Deployment;
use kibaship_core::domain::domain::ApplicationDomain;
use kibaship_core::domain::meta::Labels;
use kibaship_core::domain::routing::HttpRoute;
use kibaship_core::{labels, naming};
use tracing::{debug, info, warn};

use super::materialize::route_pair;
use super::owner_of;
use crate::error::Result;
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Promotion {
    /// This deployment just became current
    Promoted,
    /// This deployment was already current
    AlreadyCurrent,
    /// Another deployment stays current
    Skipped,
}

/// Promote when requested or when the application has nothing current yet
pub fn should_promote(deployment: &Deployment, app: &Application) -> bool {
    deployment.spec.promote || app.spec.current_deployment_ref.is_none()
}

fn is_current(deployment: &Deployment, app: &Application) -> bool {
    app.spec
        .current_deployment_ref
        .as_ref()
        .is_some_and(|r| r.name == deployment.metadata.name)
}

pub async fn promote(store: &Store, deployment: &Deployment, app: &Application) -> Result<Promotion> {
    let outcome = if is_current(deployment, app) {
        Promotion::AlreadyCurrent
    } else if should_promote(deployment, app) {
        let mut updated = app.clone();
        updated.spec.current_deployment_ref = Some(LocalObjectReference {
            name: deployment.metadata.name.clone(),
        });
        store.update(&updated).await?;
        info!(
            "Promoted deployment {} to current for application {}",
            deployment.metadata.name, app.metadata.name
        );
        Promotion::Promoted
    } else {
        debug!(
            "Deployment {} not promoted, application {} keeps its current deployment",
            deployment.metadata.name, app.metadata.name
        );
        return Ok(Promotion::Skipped);
    };

    // Also runs when already current so a retry completes a half-done promotion
    route_application(store, deployment, app).await?;
    Ok(outcome)
}

/// The application's domain flagged default, if any
pub async fn default_domain(store: &Store, app: &Application) -> Result<Option<ApplicationDomain>> {
    let mut selector = Labels::new();
    selector.insert(labels::APPLICATION_UUID.to_string(), app.spec.uuid.to_string());

    let domains: Vec<ApplicationDomain> = store
        .list(Some(&app.metadata.namespace), &selector)
        .await?;
    Ok(domains.into_iter().find(|d| d.spec.default))
}

/// Points the application routes at this deployment's service
async fn route_application(store: &Store, deployment: &Deployment, app: &Application) -> Result<()> {
    let Some(domain) = default_domain(store, app).await? else {
        warn!(
            "Application {} has no default domain, application routes not written (degraded)",
            app.metadata.name
        );
        return Ok(());
    };

    let routes = route_pair(
        deployment,
        naming::app_route_name(app.spec.uuid),
        naming::app_redirect_route_name(app.spec.uuid),
        &domain.spec.domain,
        &naming::service_name(deployment.spec.uuid),
        domain.spec.port,
        owner_of(deployment)?,
    );

    for route in routes {
        apply_route(store, route).await?;
    }
    Ok(())
}

/// Creates the route or replaces the existing one's spec and ownership
async fn apply_route(store: &Store, desired: HttpRoute) -> Result<()> {
    let meta = &desired.metadata;
    match store.get::<HttpRoute>(&meta.namespace, &meta.name).await? {
        Some(mut existing) => {
            if existing.spec == desired.spec
                && existing.metadata.owner_references == desired.metadata.owner_references
            {
                return Ok(());
            }
            existing.spec = desired.spec;
            existing.metadata.labels = desired.metadata.labels;
            existing.metadata.owner_references = desired.metadata.owner_references;
            store.update(&existing).await?;
            info!("Updated route {}", existing.metadata.name);
        }
        None => {
            store.create(&desired).await?;
            info!("Created route {}", desired.metadata.name);
        }
    }
    Ok(())
}
