//! Application domain types

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::domain::meta::{Kind, ObjectMeta};
use crate::impl_resource;

/// A logical workload definition that accumulates many deployments
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    pub metadata: ObjectMeta,
    pub spec: ApplicationSpec,
}

impl_resource!(Application, Kind::Application);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSpec {
    pub uuid: Uuid,
    pub slug: String,
    pub project_uuid: Uuid,
    pub source: ApplicationSource,
    /// Serving port; the configured default applies when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// The deployment currently serving traffic, changed only by promotion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_deployment_ref: Option<LocalObjectReference>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalObjectReference {
    pub name: String,
}

/// Application type with its type-specific configuration
///
/// Adding a variant forces every match over it (build trigger, phase
/// mapping, materialization, naming) to be revisited.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "config")]
pub enum ApplicationSource {
    GitRepository(GitRepositoryConfig),
    ImageFromRegistry(ImageFromRegistryConfig),
    Database(DatabaseConfig),
}

impl ApplicationSource {
    pub fn type_name(&self) -> &'static str {
        match self {
            ApplicationSource::GitRepository(_) => "GitRepository",
            ApplicationSource::ImageFromRegistry(_) => "ImageFromRegistry",
            ApplicationSource::Database(db) => db.engine.as_str(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitRepositoryConfig {
    /// Git host, e.g. `github.com`
    pub provider: String,
    /// Repository path on the host, e.g. `acme/web`
    pub repository: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default)]
    pub public_access: bool,
    /// Secret holding the git access token for private repositories
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_directory: Option<String>,
    #[serde(default)]
    pub build: BuildStrategy,
}

impl GitRepositoryConfig {
    pub fn clone_url(&self) -> String {
        format!("https://{}/{}", self.provider, self.repository)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "camelCase")]
pub enum BuildStrategy {
    #[default]
    Railpack,
    #[serde(rename_all = "camelCase")]
    Dockerfile {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        dockerfile_path: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        build_context: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageFromRegistryConfig {
    pub registry: RegistryKind,
    pub repository: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_tag: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RegistryKind {
    DockerHub,
    Ghcr,
    Custom(String),
}

impl RegistryKind {
    pub fn host(&self) -> &str {
        match self {
            RegistryKind::DockerHub => "docker.io",
            RegistryKind::Ghcr => "ghcr.io",
            RegistryKind::Custom(host) => host,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub engine: DatabaseEngine,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DatabaseEngine {
    MySql,
    MySqlCluster,
    Postgres,
    PostgresCluster,
    Valkey,
    ValkeyCluster,
}

impl DatabaseEngine {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseEngine::MySql => "MySQL",
            DatabaseEngine::MySqlCluster => "MySQLCluster",
            DatabaseEngine::Postgres => "Postgres",
            DatabaseEngine::PostgresCluster => "PostgresCluster",
            DatabaseEngine::Valkey => "Valkey",
            DatabaseEngine::ValkeyCluster => "ValkeyCluster",
        }
    }
}

impl fmt::Display for DatabaseEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
