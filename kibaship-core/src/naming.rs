//! Resource naming
//!
//! Every generated object name is a deterministic function of a stable UUID
//! and the object kind. Consumers outside this engine read these names, so
//! the formats must not change.

use rand::Rng;
use uuid::Uuid;

/// In-cluster registry that build pipelines push to
pub const INTERNAL_REGISTRY: &str = "registry.registry.svc.cluster.local";

const SLUG_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const SLUG_LEN: usize = 8;

pub fn project_name(project_uuid: Uuid) -> String {
    format!("project-{}", project_uuid)
}

pub fn service_account_name(project_uuid: Uuid) -> String {
    format!("project-{}-sa", project_uuid)
}

pub fn application_name(app_uuid: Uuid) -> String {
    format!("application-{}", app_uuid)
}

/// Upstream environment secret of an application
pub fn application_secret_name(app_uuid: Uuid) -> String {
    application_name(app_uuid)
}

pub fn deployment_name(deployment_uuid: Uuid) -> String {
    format!("deployment-{}", deployment_uuid)
}

/// Environment secret frozen for one deployment
pub fn deployment_secret_name(deployment_uuid: Uuid) -> String {
    deployment_name(deployment_uuid)
}

pub fn workload_name(deployment_uuid: Uuid) -> String {
    deployment_name(deployment_uuid)
}

pub fn service_name(deployment_uuid: Uuid) -> String {
    format!("service-{}", deployment_uuid)
}

pub fn domain_name(deployment_uuid: Uuid) -> String {
    format!("domain-{}", deployment_uuid)
}

pub fn pipeline_name(deployment_uuid: Uuid) -> String {
    format!("pipeline-{}", deployment_uuid)
}

pub fn pipeline_run_name(deployment_uuid: Uuid, generation: i64) -> String {
    format!("pipeline-run-{}-{}", deployment_uuid, generation)
}

pub fn workspace_name(deployment_uuid: Uuid) -> String {
    format!("workspace-{}", deployment_uuid)
}

pub fn route_name(deployment_uuid: Uuid) -> String {
    format!("httproute-{}", deployment_uuid)
}

pub fn redirect_route_name(deployment_uuid: Uuid) -> String {
    format!("httproute-{}-redirect", deployment_uuid)
}

pub fn app_route_name(app_uuid: Uuid) -> String {
    format!("httproute-app-{}", app_uuid)
}

pub fn app_redirect_route_name(app_uuid: Uuid) -> String {
    format!("httproute-app-{}-redirect", app_uuid)
}

/// Per-deployment hostname: `<deployment-uuid>.apps.<base-domain>`
pub fn deployment_host(deployment_uuid: Uuid, base_domain: &str) -> String {
    format!("{}.apps.{}", deployment_uuid, base_domain)
}

/// Image reference a build pipeline produces for a deployment
pub fn build_image(namespace: &str, app_uuid: Uuid, deployment_uuid: Uuid) -> String {
    format!(
        "{}/{}/{}:{}",
        INTERNAL_REGISTRY, namespace, app_uuid, deployment_uuid
    )
}

/// Random human-readable slug over `[a-z0-9]`
pub fn generate_slug() -> String {
    let mut rng = rand::thread_rng();
    (0..SLUG_LEN)
        .map(|_| SLUG_ALPHABET[rng.gen_range(0..SLUG_ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uuid() -> Uuid {
        Uuid::parse_str("6f1e2d3c-4b5a-4978-8a6b-5c4d3e2f1a0b").unwrap()
    }

    #[test]
    fn test_names_follow_contract() {
        let id = uuid();
        assert_eq!(pipeline_name(id), format!("pipeline-{}", id));
        assert_eq!(pipeline_run_name(id, 3), format!("pipeline-run-{}-3", id));
        assert_eq!(workspace_name(id), format!("workspace-{}", id));
        assert_eq!(route_name(id), format!("httproute-{}", id));
        assert_eq!(redirect_route_name(id), format!("httproute-{}-redirect", id));
        assert_eq!(app_route_name(id), format!("httproute-app-{}", id));
        assert_eq!(app_redirect_route_name(id), format!("httproute-app-{}-redirect", id));
        assert_eq!(service_account_name(id), format!("project-{}-sa", id));
    }

    #[test]
    fn test_deployment_host() {
        assert_eq!(
            deployment_host(uuid(), "example.com"),
            "6f1e2d3c-4b5a-4978-8a6b-5c4d3e2f1a0b.apps.example.com"
        );
    }

    #[test]
    fn test_build_image() {
        let app = Uuid::nil();
        assert_eq!(
            build_image("project-a", app, uuid()),
            format!(
                "registry.registry.svc.cluster.local/project-a/{}:{}",
                app,
                uuid()
            )
        );
    }

    #[test]
    fn test_generate_slug_shape() {
        let slug = generate_slug();
        assert_eq!(slug.len(), 8);
        assert!(slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }
}
