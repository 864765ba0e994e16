//! Service Module
//!
//! Business logic shared by the controllers and the API: materializing a
//! deployment's runtime objects, promotion, lifecycle notifications and
//! admission of user-facing resources.

pub mod admission;
pub mod lifecycle;
pub mod materialize;
pub mod promotion;

use kibaship_core::domain::deployment::Deployment;
use kibaship_core::domain::meta::{OwnerReference, Resource};
use tracing::{debug, info};

use crate::error::{ReconcileError, Result};
use crate::store::Store;

/// Creates `object` unless an object with its name already exists
///
/// Existing objects are never modified. Losing a create race counts as
/// success. Returns `true` when this call created the object.
pub async fn ensure<T: Resource>(store: &Store, object: &T) -> Result<bool> {
    let meta = object.meta();
    if store.get::<T>(&meta.namespace, &meta.name).await?.is_some() {
        debug!("{} {} already exists", T::KIND, meta.name);
        return Ok(false);
    }

    let created = store.create_if_absent(object).await?;
    if created {
        info!("Created {} {}", T::KIND, meta.name);
    }
    Ok(created)
}

/// Controller reference to a stored deployment
pub fn owner_of(deployment: &Deployment) -> Result<OwnerReference> {
    deployment.controller_reference().ok_or_else(|| {
        ReconcileError::config(format!(
            "deployment {} has no uid",
            deployment.metadata.key()
        ))
    })
}
