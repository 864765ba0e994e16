//! HTTP routing rules attached to the platform gateway

use serde::{Deserialize, Serialize};

use crate::domain::meta::{Kind, ObjectMeta};
use crate::impl_resource;

pub const GATEWAY_NAME: &str = "kibaship-gateway";
pub const GATEWAY_NAMESPACE: &str = "kibaship";
pub const HTTPS_LISTENER: &str = "https";
pub const HTTP_LISTENER: &str = "http";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpRoute {
    pub metadata: ObjectMeta,
    pub spec: HttpRouteSpec,
}

impl_resource!(HttpRoute, Kind::HttpRoute);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpRouteSpec {
    pub parent_refs: Vec<ParentRef>,
    pub hostnames: Vec<String>,
    pub rules: Vec<RouteRule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentRef {
    pub name: String,
    pub namespace: String,
    pub section_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteRule {
    pub matches: Vec<PathMatch>,
    #[serde(default)]
    pub backend_refs: Vec<BackendRef>,
    #[serde(default)]
    pub filters: Vec<RouteFilter>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathMatch {
    #[serde(rename = "type")]
    pub match_type: String,
    pub value: String,
}

impl PathMatch {
    pub fn prefix(value: impl Into<String>) -> Self {
        Self {
            match_type: "PathPrefix".to_string(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendRef {
    pub name: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RouteFilter {
    #[serde(rename_all = "camelCase")]
    RequestRedirect { scheme: String },
}

impl HttpRouteSpec {
    /// Route `hostname` over the TLS listener to a service port
    pub fn https(hostname: &str, service: &str, port: u16) -> Self {
        Self {
            parent_refs: vec![gateway_ref(HTTPS_LISTENER)],
            hostnames: vec![hostname.to_string()],
            rules: vec![RouteRule {
                matches: vec![PathMatch::prefix("/")],
                backend_refs: vec![BackendRef {
                    name: service.to_string(),
                    port,
                }],
                filters: Vec::new(),
            }],
        }
    }

    /// Redirect plaintext requests for `hostname` to https
    pub fn https_redirect(hostname: &str) -> Self {
        Self {
            parent_refs: vec![gateway_ref(HTTP_LISTENER)],
            hostnames: vec![hostname.to_string()],
            rules: vec![RouteRule {
                matches: vec![PathMatch::prefix("/")],
                backend_refs: Vec::new(),
                filters: vec![RouteFilter::RequestRedirect {
                    scheme: "https".to_string(),
                }],
            }],
        }
    }

    pub fn backend(&self) -> Option<&BackendRef> {
        self.rules.iter().flat_map(|r| r.backend_refs.iter()).next()
    }
}

fn gateway_ref(section: &str) -> ParentRef {
    ParentRef {
        name: GATEWAY_NAME.to_string(),
        namespace: GATEWAY_NAMESPACE.to_string(),
        section_name: section.to_string(),
    }
}
