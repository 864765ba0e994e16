//! Resource Materialization
//!
//! Creates the runtime objects of a deployment: workload, service,
//! per-deployment domain and its two routes. Every object is owned by the
//! deployment, created once and never mutated afterwards, so running this
//! repeatedly is safe.

use kibaship_core::domain::application::{Application, ApplicationSource, LocalObjectReference};
use kibaship_core::domain::deployment::Deployment;
use kibaship_core::domain::domain::{ApplicationDomain, ApplicationDomainSpec};
use kibaship_core::domain::meta::{Labels, ObjectMeta, OwnerReference};
use kibaship_core::domain::routing::{HttpRoute, HttpRouteSpec};
use kibaship_core::domain::workload::{
    Container, ContainerPort, Service, ServicePort, ServiceSpec, Workload, WorkloadSpec,
    WorkloadStatus,
};
use kibaship_core::{labels, naming};
use tracing::info;

use super::{ensure, owner_of};
use crate::config::Config;
use crate::error::{ReconcileError, Result};
use crate::store::Store;

const CONTAINER_NAME: &str = "app";
const PORT_NAME: &str = "http";
const PROTOCOL: &str = "TCP";
const DEFAULT_TAG: &str = "latest";
const REGISTRY_PULL_SECRET: &str = "registry-image-pull-secret";

/// Serving port of an application
pub fn application_port(app: &Application, config: &Config) -> u16 {
    app.spec.port.unwrap_or(config.default_port)
}

/// Image the workload runs
pub fn image_for(deployment: &Deployment, app: &Application) -> Result<String> {
    match &app.spec.source {
        ApplicationSource::GitRepository(_) => Ok(naming::build_image(
            &deployment.metadata.namespace,
            app.spec.uuid,
            deployment.spec.uuid,
        )),
        ApplicationSource::ImageFromRegistry(registry) => {
            let tag = deployment
                .spec
                .image_from_registry
                .as_ref()
                .and_then(|c| c.tag.as_deref())
                .or(registry.default_tag.as_deref())
                .unwrap_or(DEFAULT_TAG);
            Ok(format!(
                "{}/{}:{}",
                registry.registry.host(),
                registry.repository,
                tag
            ))
        }
        ApplicationSource::Database(db) => Err(ReconcileError::config(format!(
            "{} applications have no workload image",
            db.engine
        ))),
    }
}

fn component_labels(deployment: &Deployment, name: &str, component: &str) -> Labels {
    let spec = &deployment.spec;
    labels::for_component(
        spec.project_uuid,
        spec.application_uuid,
        spec.uuid,
        name,
        component,
    )
}

pub fn desired_workload(
    deployment: &Deployment,
    app: &Application,
    config: &Config,
    owner: OwnerReference,
) -> Result<Workload> {
    let spec = &deployment.spec;
    let image = image_for(deployment, app)?;

    let image_pull_secrets = match app.spec.source {
        ApplicationSource::GitRepository(_) => vec![REGISTRY_PULL_SECRET.to_string()],
        _ => Vec::new(),
    };

    let metadata = ObjectMeta::new(&deployment.metadata.namespace, naming::workload_name(spec.uuid))
        .with_labels(component_labels(
            deployment,
            &format!("app-{}", spec.application_uuid),
            "application",
        ))
        .with_owner(owner);

    Ok(Workload {
        metadata,
        spec: WorkloadSpec {
            replicas: 1,
            selector: labels::pod_selector(spec.application_uuid, spec.uuid),
            containers: vec![Container {
                name: CONTAINER_NAME.to_string(),
                image,
                ports: vec![ContainerPort {
                    name: PORT_NAME.to_string(),
                    container_port: application_port(app, config),
                    protocol: PROTOCOL.to_string(),
                }],
                env_from_secrets: vec![naming::deployment_secret_name(spec.uuid)],
                resources: config.resource_profile.requirements(),
            }],
            image_pull_secrets,
        },
        status: WorkloadStatus::default(),
    })
}

pub fn desired_service(
    deployment: &Deployment,
    app: &Application,
    config: &Config,
    owner: OwnerReference,
) -> Service {
    let spec = &deployment.spec;
    let port = application_port(app, config);

    let metadata = ObjectMeta::new(&deployment.metadata.namespace, naming::service_name(spec.uuid))
        .with_labels(component_labels(
            deployment,
            &naming::project_name(spec.project_uuid),
            "application-service",
        ))
        .with_owner(owner);

    Service {
        metadata,
        spec: ServiceSpec {
            selector: labels::pod_selector(spec.application_uuid, spec.uuid),
            ports: vec![ServicePort {
                name: PORT_NAME.to_string(),
                protocol: PROTOCOL.to_string(),
                port,
                target_port: port,
            }],
        },
    }
}

pub fn desired_domain(
    deployment: &Deployment,
    app: &Application,
    config: &Config,
    owner: OwnerReference,
) -> ApplicationDomain {
    let spec = &deployment.spec;

    let mut domain_labels = labels::identity(spec.project_uuid, spec.application_uuid, spec.uuid);
    domain_labels.insert(labels::UUID.to_string(), spec.uuid.to_string());
    domain_labels.insert(labels::SLUG.to_string(), naming::generate_slug());

    let metadata = ObjectMeta::new(&deployment.metadata.namespace, naming::domain_name(spec.uuid))
        .with_labels(domain_labels)
        .with_owner(owner);

    ApplicationDomain {
        metadata,
        spec: ApplicationDomainSpec {
            application_ref: LocalObjectReference {
                name: app.metadata.name.clone(),
            },
            domain: naming::deployment_host(spec.uuid, &config.base_domain),
            port: application_port(app, config),
            default: false,
            tls_enabled: true,
        },
    }
}

/// Route labels: identity chain plus the route marker
pub fn route_labels(deployment: &Deployment, name: &str) -> Labels {
    let mut route_labels = component_labels(deployment, name, "http-route");
    route_labels.insert(labels::ROUTE_TYPE.to_string(), "httproute".to_string());
    route_labels
}

/// The HTTPS route and its HTTP redirect twin, in the deployment's namespace
pub fn route_pair(
    deployment: &Deployment,
    https_name: String,
    redirect_name: String,
    hostname: &str,
    service: &str,
    port: u16,
    owner: OwnerReference,
) -> [HttpRoute; 2] {
    let namespace = &deployment.metadata.namespace;
    let https = HttpRoute {
        metadata: ObjectMeta::new(namespace, &https_name)
            .with_labels(route_labels(deployment, &https_name))
            .with_owner(owner.clone()),
        spec: HttpRouteSpec::https(hostname, service, port),
    };
    let redirect = HttpRoute {
        metadata: ObjectMeta::new(namespace, &redirect_name)
            .with_labels(route_labels(deployment, &redirect_name))
            .with_owner(owner),
        spec: HttpRouteSpec::https_redirect(hostname),
    };
    [https, redirect]
}

/// Ensures every runtime object of the deployment exists
pub async fn materialize(
    store: &Store,
    config: &Config,
    deployment: &Deployment,
    app: &Application,
) -> Result<()> {
    let owner = owner_of(deployment)?;
    let uuid = deployment.spec.uuid;

    ensure(store, &desired_workload(deployment, app, config, owner.clone())?).await?;
    ensure(store, &desired_service(deployment, app, config, owner.clone())).await?;

    let domain = desired_domain(deployment, app, config, owner.clone());
    ensure(store, &domain).await?;

    let routes = route_pair(
        deployment,
        naming::route_name(uuid),
        naming::redirect_route_name(uuid),
        &domain.spec.domain,
        &naming::service_name(uuid),
        application_port(app, config),
        owner,
    );
    for route in &routes {
        ensure(store, route).await?;
    }

    info!(
        "Materialized deployment {} at {}",
        deployment.metadata.name, domain.spec.domain
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, NS};
    use kibaship_core::domain::deployment::ImageFromRegistryDeploymentConfig;

    #[test]
    fn test_registry_tag_precedence() {
        let app = testing::registry_app("api", Some("1.0"));
        let mut deployment = testing::deployment("api-1", &app);

        assert_eq!(image_for(&deployment, &app).unwrap(), "docker.io/acme/api:1.0");

        deployment.spec.image_from_registry = Some(ImageFromRegistryDeploymentConfig {
            tag: Some("2.0".into()),
        });
        assert_eq!(image_for(&deployment, &app).unwrap(), "docker.io/acme/api:2.0");

        let app = testing::registry_app("api", None);
        deployment.spec.image_from_registry = None;
        assert_eq!(image_for(&deployment, &app).unwrap(), "docker.io/acme/api:latest");
    }

    #[test]
    fn test_build_image_for_git_apps() {
        let app = testing::git_app("web");
        let deployment = testing::deployment("web-1", &app);
        assert_eq!(
            image_for(&deployment, &app).unwrap(),
            format!(
                "registry.registry.svc.cluster.local/{}/{}:{}",
                NS, app.spec.uuid, deployment.spec.uuid
            )
        );
    }

    #[tokio::test]
    async fn test_materialize_creates_owned_runtime_set() {
        let (store, config) = (testing::store(), testing::config());
        let app = store.create(&testing::git_app("web")).await.unwrap();
        let deployment = store.create(&testing::deployment("web-1", &app)).await.unwrap();
        let uuid = deployment.spec.uuid;
        let uid = deployment.metadata.uid.unwrap();

        materialize(&store, &config, &deployment, &app).await.unwrap();

        let workload: Workload = store.fetch(NS, &naming::workload_name(uuid)).await.unwrap();
        assert_eq!(workload.spec.replicas, 1);
        assert_eq!(workload.spec.containers[0].name, "app");
        assert_eq!(workload.spec.containers[0].ports[0].container_port, 3000);
        assert_eq!(workload.spec.containers[0].env_from_secrets, vec![naming::deployment_secret_name(uuid)]);
        assert!(workload.metadata.is_owned_by(uid));
        assert_eq!(workload.metadata.label(labels::MANAGED_BY), Some("kibaship"));

        let service: Service = store.fetch(NS, &naming::service_name(uuid)).await.unwrap();
        assert_eq!(service.spec.selector, workload.spec.selector);

        let domain: ApplicationDomain = store.fetch(NS, &naming::domain_name(uuid)).await.unwrap();
        assert_eq!(domain.spec.domain, format!("{}.apps.example.com", uuid));
        assert!(!domain.spec.default);
        assert!(domain.spec.tls_enabled);

        let route: HttpRoute = store.fetch(NS, &naming::route_name(uuid)).await.unwrap();
        let backend = route.spec.backend().unwrap();
        assert_eq!(backend.name, naming::service_name(uuid));
        assert_eq!(route.spec.hostnames, vec![domain.spec.domain.clone()]);

        let redirect: HttpRoute = store.fetch(NS, &naming::redirect_route_name(uuid)).await.unwrap();
        assert!(redirect.spec.backend().is_none());
    }

    #[tokio::test]
    async fn test_materialize_is_idempotent() {
        let (store, config) = (testing::store(), testing::config());
        let app = store.create(&testing::git_app("web")).await.unwrap();
        let deployment = store.create(&testing::deployment("web-1", &app)).await.unwrap();

        materialize(&store, &config, &deployment, &app).await.unwrap();
        let first: Workload = store
            .fetch(NS, &naming::workload_name(deployment.spec.uuid))
            .await
            .unwrap();

        materialize(&store, &config, &deployment, &app).await.unwrap();
        let second: Workload = store
            .fetch(NS, &naming::workload_name(deployment.spec.uuid))
            .await
            .unwrap();

        assert_eq!(first.metadata.resource_version, second.metadata.resource_version);
        let routes: Vec<HttpRoute> = store.list(Some(NS), &Labels::new()).await.unwrap();
        assert_eq!(routes.len(), 2);
    }

    #[tokio::test]
    async fn test_deleting_deployment_removes_runtime_set() {
        let (store, config) = (testing::store(), testing::config());
        let app = store.create(&testing::git_app("web")).await.unwrap();
        let deployment = store.create(&testing::deployment("web-1", &app)).await.unwrap();
        materialize(&store, &config, &deployment, &app).await.unwrap();

        store.delete::<Deployment>(NS, "web-1").await.unwrap();

        let workloads: Vec<Workload> = store.list(None, &Labels::new()).await.unwrap();
        let routes: Vec<HttpRoute> = store.list(None, &Labels::new()).await.unwrap();
        assert!(workloads.is_empty());
        assert!(routes.is_empty());
        assert!(store.get::<Application>(NS, "web").await.unwrap().is_some());
    }

    #[test]
    fn test_custom_port_and_profile() {
        let mut app = testing::git_app("web");
        app.spec.port = Some(8080);
        let mut config = testing::config();
        config.resource_profile = kibaship_core::profile::ResourceProfile::Performance;

        let deployment = testing::deployment("web-1", &app);
        let owner = testing::owner(&deployment);
        let workload = desired_workload(&deployment, &app, &config, owner.clone()).unwrap();
        assert_eq!(workload.spec.containers[0].ports[0].container_port, 8080);
        assert_eq!(workload.spec.containers[0].resources.limits.memory, "2Gi");

        let service = desired_service(&deployment, &app, &config, owner);
        assert_eq!(service.spec.ports[0].port, 8080);
    }
}
