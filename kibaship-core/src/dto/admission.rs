//! Admission requests
//!
//! Requests that create the user-facing resources. Identity (UUID, slug and
//! labels) is assigned on admission, never supplied by the caller.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::domain::application::ApplicationSource;
use crate::domain::deployment::{GitRepositoryDeploymentConfig, ImageFromRegistryDeploymentConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateApplication {
    pub namespace: String,
    pub name: String,
    pub project_uuid: Uuid,
    pub source: ApplicationSource,
    #[serde(default)]
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDeployment {
    pub namespace: String,
    pub name: String,
    /// Name of the owning application in the same namespace
    pub application: String,
    #[serde(default)]
    pub git_repository: Option<GitRepositoryDeploymentConfig>,
    #[serde(default)]
    pub image_from_registry: Option<ImageFromRegistryDeploymentConfig>,
    #[serde(default)]
    pub promote: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDomain {
    pub namespace: String,
    pub name: String,
    pub application: String,
    pub domain: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub default: bool,
}

/// Upstream environment secret for an application
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PutApplicationSecret {
    pub namespace: String,
    pub application: String,
    pub data: BTreeMap<String, String>,
}
