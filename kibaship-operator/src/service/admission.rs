//! Admission Service
//!
//! Creates user-facing resources with their identity assigned, and applies
//! status reports from the build system and the runtime.

use kibaship_core::domain::application::{Application, ApplicationSource, ApplicationSpec, LocalObjectReference};
use kibaship_core::domain::condition::{self, Condition, set_condition};
use kibaship_core::domain::deployment::{Deployment, DeploymentSpec, DeploymentStatus};
use kibaship_core::domain::domain::{ApplicationDomain, ApplicationDomainSpec};
use kibaship_core::domain::meta::{ObjectMeta, Resource};
use kibaship_core::domain::pipeline::PipelineRun;
use kibaship_core::domain::secret::Secret;
use kibaship_core::domain::workload::{Workload, WorkloadStatus};
use kibaship_core::dto::admission::{CreateApplication, CreateDeployment, CreateDomain, PutApplicationSecret};
use kibaship_core::dto::status::PipelineRunReport;
use kibaship_core::{labels, naming};
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;
use uuid::Uuid;

use super::promotion::default_domain;
use crate::config::Config;
use crate::error::ReconcileError;
use crate::store::{Store, StoreError};

/// Service error type
#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Invalid(String),

    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for AdmissionError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AlreadyExists { kind, key } => {
                AdmissionError::AlreadyExists(format!("{} {}", kind, key))
            }
            StoreError::NotFound { kind, key } => AdmissionError::NotFound(format!("{} {}", kind, key)),
            other => AdmissionError::Store(other),
        }
    }
}

impl From<ReconcileError> for AdmissionError {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::Store(e) => e.into(),
            other => AdmissionError::Invalid(other.to_string()),
        }
    }
}

/// Lowercase DNS label (RFC 1123)
static DNS_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").expect("DNS label regex is valid"));

fn validate_name(field: &str, value: &str) -> Result<(), AdmissionError> {
    if value.len() > 63 || !DNS_LABEL.is_match(value) {
        return Err(AdmissionError::Invalid(format!(
            "{} must be a lowercase DNS label, got '{}'",
            field, value
        )));
    }
    Ok(())
}

async fn find<T: Resource>(store: &Store, namespace: &str, name: &str) -> Result<T, AdmissionError> {
    store
        .get(namespace, name)
        .await?
        .ok_or_else(|| AdmissionError::NotFound(format!("{} {}/{}", T::KIND, namespace, name)))
}

pub async fn create_application(store: &Store, req: CreateApplication) -> Result<Application, AdmissionError> {
    validate_name("namespace", &req.namespace)?;
    validate_name("name", &req.name)?;

    if req.port == Some(0) {
        return Err(AdmissionError::Invalid("port must be between 1 and 65535".into()));
    }
    match &req.source {
        ApplicationSource::GitRepository(git) if git.provider.is_empty() || git.repository.is_empty() => {
            return Err(AdmissionError::Invalid(
                "gitRepository requires provider and repository".into(),
            ));
        }
        ApplicationSource::ImageFromRegistry(image) if image.repository.is_empty() => {
            return Err(AdmissionError::Invalid("imageFromRegistry requires repository".into()));
        }
        _ => {}
    }

    let uuid = Uuid::new_v4();
    let slug = naming::generate_slug();

    let mut metadata = ObjectMeta::new(&req.namespace, &req.name);
    metadata.labels.insert(labels::MANAGED_BY.into(), labels::MANAGED_BY_VALUE.into());
    metadata.labels.insert(labels::UUID.into(), uuid.to_string());
    metadata.labels.insert(labels::SLUG.into(), slug.clone());
    metadata.labels.insert(labels::PROJECT_UUID.into(), req.project_uuid.to_string());

    let app = Application {
        metadata,
        spec: ApplicationSpec {
            uuid,
            slug,
            project_uuid: req.project_uuid,
            source: req.source,
            port: req.port,
            current_deployment_ref: None,
        },
    };

    let created = store.create(&app).await?;
    tracing::info!(
        "Application created: {} ({}) type {}",
        created.metadata.key(),
        uuid,
        created.spec.source.type_name()
    );
    Ok(created)
}

pub async fn create_deployment(store: &Store, req: CreateDeployment) -> Result<Deployment, AdmissionError> {
    validate_name("namespace", &req.namespace)?;
    validate_name("name", &req.name)?;

    let app: Application = find(store, &req.namespace, &req.application).await?;

    match &app.spec.source {
        ApplicationSource::GitRepository(_) => match &req.git_repository {
            Some(git) if !git.commit_sha.is_empty() => {}
            _ => {
                return Err(AdmissionError::Invalid(
                    "gitRepository.commitSha is required for GitRepository applications".into(),
                ));
            }
        },
        ApplicationSource::ImageFromRegistry(_) if req.image_from_registry.is_none() => {
            return Err(AdmissionError::Invalid(
                "imageFromRegistry is required for ImageFromRegistry applications".into(),
            ));
        }
        ApplicationSource::ImageFromRegistry(_) | ApplicationSource::Database(_) => {}
    }

    let uuid = Uuid::new_v4();
    let slug = naming::generate_slug();

    let mut metadata = ObjectMeta::new(&req.namespace, &req.name)
        .with_labels(labels::identity(app.spec.project_uuid, app.spec.uuid, uuid));
    metadata.labels.insert(labels::UUID.into(), uuid.to_string());
    metadata.labels.insert(labels::SLUG.into(), slug.clone());
    if let Some(owner) = app.controller_reference() {
        metadata = metadata.with_owner(owner);
    }

    let deployment = Deployment {
        metadata,
        spec: DeploymentSpec {
            uuid,
            slug,
            project_uuid: app.spec.project_uuid,
            application_uuid: app.spec.uuid,
            application_ref: LocalObjectReference {
                name: app.metadata.name.clone(),
            },
            git_repository: req.git_repository,
            image_from_registry: req.image_from_registry,
            promote: req.promote,
        },
        status: DeploymentStatus::default(),
    };

    let created = store.create(&deployment).await?;
    tracing::info!(
        "Deployment created: {} ({}) for application {}",
        created.metadata.key(),
        uuid,
        app.metadata.name
    );
    Ok(created)
}

pub async fn create_domain(
    store: &Store,
    config: &Config,
    req: CreateDomain,
) -> Result<ApplicationDomain, AdmissionError> {
    validate_name("namespace", &req.namespace)?;
    validate_name("name", &req.name)?;

    let app: Application = find(store, &req.namespace, &req.application).await?;

    if req.default && default_domain(store, &app).await?.is_some() {
        return Err(AdmissionError::Invalid(format!(
            "application {} already has a default domain",
            app.metadata.name
        )));
    }

    let port = req.port.or(app.spec.port).unwrap_or(config.default_port);
    if port == 0 {
        return Err(AdmissionError::Invalid("port must be between 1 and 65535".into()));
    }

    let mut metadata = ObjectMeta::new(&req.namespace, &req.name);
    metadata.labels.insert(labels::MANAGED_BY.into(), labels::MANAGED_BY_VALUE.into());
    metadata.labels.insert(labels::PROJECT_UUID.into(), app.spec.project_uuid.to_string());
    metadata.labels.insert(labels::APPLICATION_UUID.into(), app.spec.uuid.to_string());
    if let Some(owner) = app.controller_reference() {
        metadata = metadata.with_owner(owner);
    }

    let domain = ApplicationDomain {
        metadata,
        spec: ApplicationDomainSpec {
            application_ref: LocalObjectReference {
                name: app.metadata.name.clone(),
            },
            domain: req.domain,
            port,
            default: req.default,
            tls_enabled: true,
        },
    };

    Ok(store.create(&domain).await?)
}

/// Creates or replaces the application's upstream environment secret
pub async fn put_application_secret(
    store: &Store,
    req: PutApplicationSecret,
) -> Result<Secret, AdmissionError> {
    let app: Application = find(store, &req.namespace, &req.application).await?;
    let name = naming::application_secret_name(app.spec.uuid);

    match store.get::<Secret>(&req.namespace, &name).await? {
        Some(mut existing) => {
            existing.data = req.data;
            Ok(store.update(&existing).await?)
        }
        None => {
            let mut metadata = ObjectMeta::new(&req.namespace, &name);
            metadata.labels.insert(labels::MANAGED_BY.into(), labels::MANAGED_BY_VALUE.into());
            metadata.labels.insert(labels::APPLICATION_UUID.into(), app.spec.uuid.to_string());
            if let Some(owner) = app.controller_reference() {
                metadata = metadata.with_owner(owner);
            }
            Ok(store
                .create(&Secret {
                    metadata,
                    data: req.data,
                })
                .await?)
        }
    }
}

/// Records the build system's verdict on a pipeline run
pub async fn report_pipeline_run(
    store: &Store,
    namespace: &str,
    name: &str,
    report: PipelineRunReport,
) -> Result<PipelineRun, AdmissionError> {
    let mut run: PipelineRun = find(store, namespace, name).await?;

    let changed = set_condition(
        &mut run.status.conditions,
        Condition::new(condition::SUCCEEDED, report.status, report.reason, report.message),
    );
    if !changed {
        return Ok(run);
    }
    Ok(store.update(&run).await?)
}

/// Records the runtime's view of a workload
pub async fn report_workload(
    store: &Store,
    namespace: &str,
    name: &str,
    status: WorkloadStatus,
) -> Result<Workload, AdmissionError> {
    let mut workload: Workload = find(store, namespace, name).await?;

    if workload.status == status {
        return Ok(workload);
    }
    workload.status = status;
    Ok(store.update(&workload).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, NS};
    use kibaship_core::domain::condition::ConditionStatus;
    use kibaship_core::domain::deployment::{GitRepositoryDeploymentConfig, ImageFromRegistryDeploymentConfig};
    use std::collections::BTreeMap;

    fn create_app_request(name: &str) -> CreateApplication {
        CreateApplication {
            namespace: NS.into(),
            name: name.into(),
            project_uuid: Uuid::new_v4(),
            source: ApplicationSource::GitRepository(testing::git_source()),
            port: None,
        }
    }

    fn create_deployment_request(name: &str, commit: Option<&str>) -> CreateDeployment {
        CreateDeployment {
            namespace: NS.into(),
            name: name.into(),
            application: "web".into(),
            git_repository: commit.map(|sha| GitRepositoryDeploymentConfig {
                commit_sha: sha.into(),
                branch: None,
            }),
            image_from_registry: None,
            promote: false,
        }
    }

    #[tokio::test]
    async fn test_application_identity_assigned() {
        let store = testing::store();
        let app = create_application(&store, create_app_request("web")).await.unwrap();

        assert_eq!(app.spec.slug.len(), 8);
        assert_eq!(app.metadata.label(labels::UUID), Some(app.spec.uuid.to_string().as_str()));
        assert!(matches!(
            create_application(&store, create_app_request("web")).await,
            Err(AdmissionError::AlreadyExists(_))
        ));
        assert!(matches!(
            create_application(&store, create_app_request("Bad_Name")).await,
            Err(AdmissionError::Invalid(_))
        ));
    }

    #[test]
    fn test_dns_label_names() {
        for ok in ["a", "web", "web-1", "0abc9"] {
            assert!(validate_name("name", ok).is_ok(), "{}", ok);
        }
        for bad in ["", "-web", "web-", "Web", "web.app", "web_app"] {
            assert!(validate_name("name", bad).is_err(), "{}", bad);
        }
        assert!(validate_name("name", &"a".repeat(63)).is_ok());
        assert!(validate_name("name", &"a".repeat(64)).is_err());
    }

    #[tokio::test]
    async fn test_deployment_carries_identity_chain() {
        let store = testing::store();
        let app = create_application(&store, create_app_request("web")).await.unwrap();
        let deployment = create_deployment(&store, create_deployment_request("web-1", Some("abc")))
            .await
            .unwrap();

        assert_eq!(deployment.spec.application_uuid, app.spec.uuid);
        assert_eq!(deployment.spec.project_uuid, app.spec.project_uuid);
        assert_eq!(
            deployment.metadata.label(labels::DEPLOYMENT_UUID),
            Some(deployment.spec.uuid.to_string().as_str())
        );
        assert!(deployment.metadata.is_owned_by(app.metadata.uid.unwrap()));
        assert_eq!(deployment.metadata.generation, 1);
    }

    #[tokio::test]
    async fn test_git_deployment_requires_commit() {
        let store = testing::store();
        create_application(&store, create_app_request("web")).await.unwrap();

        let err = create_deployment(&store, create_deployment_request("web-1", None))
            .await
            .unwrap_err();
        assert!(matches!(err, AdmissionError::Invalid(_)));

        let mut missing_app = create_deployment_request("web-1", Some("abc"));
        missing_app.application = "nope".into();
        assert!(matches!(
            create_deployment(&store, missing_app).await,
            Err(AdmissionError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_registry_deployment_requires_image_config() {
        let store = testing::store();
        let mut req = create_app_request("web");
        req.source = testing::registry_app("web", Some("1.4")).spec.source;
        create_application(&store, req).await.unwrap();

        let err = create_deployment(&store, create_deployment_request("web-1", None))
            .await
            .unwrap_err();
        assert!(matches!(err, AdmissionError::Invalid(_)));

        let mut req = create_deployment_request("web-1", None);
        req.image_from_registry = Some(ImageFromRegistryDeploymentConfig { tag: Some("2.0".into()) });
        let deployment = create_deployment(&store, req).await.unwrap();
        assert_eq!(deployment.spec.image_from_registry.unwrap().tag.as_deref(), Some("2.0"));
    }

    #[tokio::test]
    async fn test_single_default_domain() {
        let (store, config) = (testing::store(), testing::config());
        create_application(&store, create_app_request("web")).await.unwrap();

        let request = |name: &str| CreateDomain {
            namespace: NS.into(),
            name: name.into(),
            application: "web".into(),
            domain: format!("{}.acme.dev", name),
            port: None,
            default: true,
        };

        let domain = create_domain(&store, &config, request("primary")).await.unwrap();
        assert_eq!(domain.spec.port, 3000);
        assert!(matches!(
            create_domain(&store, &config, request("secondary")).await,
            Err(AdmissionError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn test_application_secret_upsert() {
        let store = testing::store();
        let app = create_application(&store, create_app_request("web")).await.unwrap();

        let put = |value: &str| PutApplicationSecret {
            namespace: NS.into(),
            application: "web".into(),
            data: BTreeMap::from([("DATABASE_URL".to_string(), value.to_string())]),
        };

        put_application_secret(&store, put("a")).await.unwrap();
        let secret = put_application_secret(&store, put("b")).await.unwrap();

        assert_eq!(secret.metadata.name, naming::application_secret_name(app.spec.uuid));
        assert_eq!(secret.data["DATABASE_URL"], "b");
    }

    #[tokio::test]
    async fn test_pipeline_run_report_skips_identical_writes() {
        let store = testing::store();
        let deployment = testing::deployment("web-1", &testing::git_app("web"));
        let run = kibaship_core::template::pipeline_run_for(&deployment, &testing::git_source(), "abc", None, None);
        let run = store.create(&run).await.unwrap();

        let report = || PipelineRunReport {
            status: ConditionStatus::Unknown,
            reason: "Running".into(),
            message: String::new(),
        };

        let first = report_pipeline_run(&store, NS, &run.metadata.name, report()).await.unwrap();
        let second = report_pipeline_run(&store, NS, &run.metadata.name, report()).await.unwrap();

        assert_eq!(first.metadata.resource_version, second.metadata.resource_version);
        assert_eq!(first.metadata.generation, 1);
        assert_eq!(first.succeeded_condition().unwrap().status, ConditionStatus::Unknown);
    }
}
