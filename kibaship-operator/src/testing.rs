//! Test fixtures

use kibaship_core::domain::application::{
    Application, ApplicationSource, ApplicationSpec, BuildStrategy, GitRepositoryConfig,
    ImageFromRegistryConfig, LocalObjectReference, RegistryKind,
};
use kibaship_core::domain::condition::{Condition, ConditionStatus, set_condition};
use kibaship_core::domain::deployment::{
    Deployment, DeploymentSpec, DeploymentStatus, GitRepositoryDeploymentConfig,
    ImageFromRegistryDeploymentConfig,
};
use kibaship_core::domain::domain::{ApplicationDomain, ApplicationDomainSpec};
use kibaship_core::domain::meta::{Kind, ObjectMeta, OwnerReference};
use kibaship_core::labels;
use uuid::Uuid;

use crate::config::Config;
use crate::store::Store;

pub const NS: &str = "project-ns";

pub fn store() -> Store {
    Store::memory()
}

pub fn config() -> Config {
    Config::new("example.com")
}

fn application(name: &str, source: ApplicationSource) -> Application {
    let uuid = Uuid::new_v4();
    let project_uuid = Uuid::new_v4();

    let mut metadata = ObjectMeta::new(NS, name);
    metadata.labels.insert(labels::UUID.into(), uuid.to_string());
    metadata.labels.insert(labels::PROJECT_UUID.into(), project_uuid.to_string());

    Application {
        metadata,
        spec: ApplicationSpec {
            uuid,
            slug: "appslug1".into(),
            project_uuid,
            source,
            port: None,
            current_deployment_ref: None,
        },
    }
}

pub fn git_source() -> GitRepositoryConfig {
    GitRepositoryConfig {
        provider: "github.com".into(),
        repository: "acme/web".into(),
        branch: None,
        public_access: true,
        secret_ref: None,
        root_directory: None,
        build: BuildStrategy::Railpack,
    }
}

pub fn git_app(name: &str) -> Application {
    application(name, ApplicationSource::GitRepository(git_source()))
}

pub fn registry_app(name: &str, default_tag: Option<&str>) -> Application {
    application(
        name,
        ApplicationSource::ImageFromRegistry(ImageFromRegistryConfig {
            registry: RegistryKind::DockerHub,
            repository: "acme/api".into(),
            default_tag: default_tag.map(str::to_string),
        }),
    )
}

pub fn deployment(name: &str, app: &Application) -> Deployment {
    let uuid = Uuid::new_v4();
    let metadata = ObjectMeta::new(NS, name).with_labels(labels::identity(
        app.spec.project_uuid,
        app.spec.uuid,
        uuid,
    ));

    let git_repository = match app.spec.source {
        ApplicationSource::GitRepository(_) => Some(GitRepositoryDeploymentConfig {
            commit_sha: "0123abcd".into(),
            branch: None,
        }),
        _ => None,
    };
    let image_from_registry = match app.spec.source {
        ApplicationSource::ImageFromRegistry(_) => Some(ImageFromRegistryDeploymentConfig { tag: None }),
        _ => None,
    };

    Deployment {
        metadata,
        spec: DeploymentSpec {
            uuid,
            slug: "depslug1".into(),
            project_uuid: app.spec.project_uuid,
            application_uuid: app.spec.uuid,
            application_ref: LocalObjectReference {
                name: app.metadata.name.clone(),
            },
            git_repository,
            image_from_registry,
            promote: false,
        },
        status: DeploymentStatus::default(),
    }
}

pub fn default_domain(name: &str, app: &Application, host: &str, port: u16) -> ApplicationDomain {
    let mut metadata = ObjectMeta::new(NS, name);
    metadata
        .labels
        .insert(labels::APPLICATION_UUID.into(), app.spec.uuid.to_string());

    ApplicationDomain {
        metadata,
        spec: ApplicationDomainSpec {
            application_ref: LocalObjectReference {
                name: app.metadata.name.clone(),
            },
            domain: host.into(),
            port,
            default: true,
            tls_enabled: true,
        },
    }
}

/// Owner reference for an object that was never stored
pub fn owner(deployment: &Deployment) -> OwnerReference {
    OwnerReference {
        kind: Kind::Deployment,
        name: deployment.metadata.name.clone(),
        uid: deployment.metadata.uid.unwrap_or_else(Uuid::new_v4),
        controller: true,
    }
}

/// Writes a condition the way a readiness producer would
pub async fn report(
    store: &Store,
    name: &str,
    condition_type: &str,
    status: ConditionStatus,
    reason: &str,
) -> Deployment {
    let mut deployment: Deployment = store.fetch(NS, name).await.unwrap();
    set_condition(
        &mut deployment.status.conditions,
        Condition::new(condition_type, status, reason, ""),
    );
    store.update(&deployment).await.unwrap()
}
