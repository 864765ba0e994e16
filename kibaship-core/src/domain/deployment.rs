//! Deployment domain types

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::domain::application::LocalObjectReference;
use crate::domain::condition::Condition;
use crate::domain::meta::{Kind, ObjectMeta};
use crate::impl_resource;

/// One versioned build-and-release attempt of an application
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    pub metadata: ObjectMeta,
    pub spec: DeploymentSpec,
    #[serde(default)]
    pub status: DeploymentStatus,
}

impl_resource!(Deployment, Kind::Deployment);

impl Deployment {
    pub fn uuid(&self) -> Uuid {
        self.spec.uuid
    }

    pub fn phase(&self) -> DeploymentPhase {
        self.status.phase
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentSpec {
    pub uuid: Uuid,
    pub slug: String,
    pub project_uuid: Uuid,
    pub application_uuid: Uuid,
    pub application_ref: LocalObjectReference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_repository: Option<GitRepositoryDeploymentConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_from_registry: Option<ImageFromRegistryDeploymentConfig>,
    /// Request promotion to current once the deployment succeeds
    #[serde(default)]
    pub promote: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitRepositoryDeploymentConfig {
    pub commit_sha: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageFromRegistryDeploymentConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentStatus {
    #[serde(default)]
    pub phase: DeploymentPhase,
    #[serde(default)]
    pub observed_generation: i64,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// Coarse lifecycle state, derived from conditions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeploymentPhase {
    #[default]
    Initializing,
    Building,
    Deploying,
    Succeeded,
    Failed,
}

impl DeploymentPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentPhase::Initializing => "Initializing",
            DeploymentPhase::Building => "Building",
            DeploymentPhase::Deploying => "Deploying",
            DeploymentPhase::Succeeded => "Succeeded",
            DeploymentPhase::Failed => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DeploymentPhase::Succeeded | DeploymentPhase::Failed)
    }
}

impl fmt::Display for DeploymentPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
