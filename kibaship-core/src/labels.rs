//! Labels attached to generated objects
//!
//! Every object the engine creates carries the managed-by marker and the
//! full identity chain so it can be traced back to its project, application
//! and deployment.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::domain::meta::Labels;

pub const MANAGED_BY: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY_VALUE: &str = "kibaship";
pub const NAME: &str = "app.kubernetes.io/name";
pub const COMPONENT: &str = "app.kubernetes.io/component";

pub const UUID: &str = "platform.kibaship.com/uuid";
pub const SLUG: &str = "platform.kibaship.com/slug";
pub const PROJECT_UUID: &str = "platform.kibaship.com/project-uuid";
pub const APPLICATION_UUID: &str = "platform.kibaship.com/application-uuid";
pub const DEPLOYMENT_UUID: &str = "platform.kibaship.com/deployment-uuid";
pub const BUILD_TYPE: &str = "platform.kibaship.com/build-type";
pub const ROUTE_TYPE: &str = "platform.kibaship.com/type";
pub const DEPLOYMENT_NAME: &str = "deployment.kibaship.com/name";

/// Bookkeeping annotations for pipeline-run notifications
pub const LAST_PIPELINERUN_STATUS: &str = "platform.kibaship.com/last-pipelinerun-status";
pub const LAST_PIPELINERUN_GENERATION: &str = "platform.kibaship.com/last-pipelinerun-generation";

const MAX_LABEL_LEN: usize = 63;
const TRUNCATED_PREFIX_LEN: usize = 54;

/// Fits a label value into 63 bytes
///
/// Longer values keep at most their first 54 bytes (cut on a character
/// boundary) followed by `-` and the first 8 hex digits of the SHA-256 of
/// the full value.
pub fn truncate_label(value: &str) -> String {
    if value.len() <= MAX_LABEL_LEN {
        return value.to_string();
    }

    let mut end = TRUNCATED_PREFIX_LEN;
    while !value.is_char_boundary(end) {
        end -= 1;
    }

    let digest = hex::encode(Sha256::digest(value.as_bytes()));
    format!("{}-{}", &value[..end], &digest[..8])
}

/// Identity chain plus managed-by marker
pub fn identity(project_uuid: Uuid, app_uuid: Uuid, deployment_uuid: Uuid) -> Labels {
    let mut labels = Labels::new();
    labels.insert(MANAGED_BY.to_string(), MANAGED_BY_VALUE.to_string());
    labels.insert(PROJECT_UUID.to_string(), project_uuid.to_string());
    labels.insert(APPLICATION_UUID.to_string(), app_uuid.to_string());
    labels.insert(DEPLOYMENT_UUID.to_string(), deployment_uuid.to_string());
    labels
}

/// Identity labels plus a name and component, values truncated
pub fn for_component(
    project_uuid: Uuid,
    app_uuid: Uuid,
    deployment_uuid: Uuid,
    name: &str,
    component: &str,
) -> Labels {
    let mut labels = identity(project_uuid, app_uuid, deployment_uuid);
    labels.insert(NAME.to_string(), truncate_label(name));
    labels.insert(COMPONENT.to_string(), truncate_label(component));
    labels
}

/// Selector shared by a workload's pods and its service
pub fn pod_selector(app_uuid: Uuid, deployment_uuid: Uuid) -> Labels {
    let mut labels = Labels::new();
    labels.insert(NAME.to_string(), format!("app-{}", app_uuid));
    labels.insert(DEPLOYMENT_UUID.to_string(), deployment_uuid.to_string());
    labels
}
