//! Application domain types

use serde::{Deserialize, Serialize};

use crate::domain::application::LocalObjectReference;
use crate::domain::meta::{Kind, ObjectMeta};
use crate::impl_resource;

/// A hostname through which an application is reachable
///
/// At most one domain per application is flagged `default`; promotion
/// routes application-level traffic through it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationDomain {
    pub metadata: ObjectMeta,
    pub spec: ApplicationDomainSpec,
}

impl_resource!(ApplicationDomain, Kind::ApplicationDomain);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationDomainSpec {
    pub application_ref: LocalObjectReference,
    pub domain: String,
    pub port: u16,
    #[serde(default)]
    pub default: bool,
    #[serde(default = "tls_on")]
    pub tls_enabled: bool,
}

fn tls_on() -> bool {
    true
}
