//! Object metadata shared by every stored resource

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

pub type Labels = BTreeMap<String, String>;

/// Kind of a stored resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Kind {
    Application,
    Deployment,
    ApplicationDomain,
    Secret,
    Pipeline,
    PipelineRun,
    Workload,
    Service,
    HttpRoute,
}

impl Kind {
    pub const ALL: [Kind; 9] = [
        Kind::Application,
        Kind::Deployment,
        Kind::ApplicationDomain,
        Kind::Secret,
        Kind::Pipeline,
        Kind::PipelineRun,
        Kind::Workload,
        Kind::Service,
        Kind::HttpRoute,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Application => "Application",
            Kind::Deployment => "Deployment",
            Kind::ApplicationDomain => "ApplicationDomain",
            Kind::Secret => "Secret",
            Kind::Pipeline => "Pipeline",
            Kind::PipelineRun => "PipelineRun",
            Kind::Workload => "Workload",
            Kind::Service => "Service",
            Kind::HttpRoute => "HTTPRoute",
        }
    }

    pub fn parse(value: &str) -> Option<Kind> {
        Kind::ALL.into_iter().find(|k| k.as_str() == value)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Namespaced object identity used as the work queue key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Link from a child object to the object that owns it
///
/// Deleting the owner deletes every object carrying a reference to its uid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerReference {
    pub kind: Kind,
    pub name: String,
    pub uid: Uuid,
    #[serde(default)]
    pub controller: bool,
}

/// Metadata carried by every stored resource
///
/// `uid`, `generation`, `resource_version` and `creation_timestamp` are
/// assigned by the store; callers leave them at their defaults on create.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<Uuid>,
    #[serde(default)]
    pub labels: Labels,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    #[serde(default)]
    pub owner_references: Vec<OwnerReference>,
    #[serde(default)]
    pub generation: i64,
    #[serde(default)]
    pub resource_version: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,
}

impl ObjectMeta {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    pub fn with_labels(mut self, labels: Labels) -> Self {
        self.labels = labels;
        self
    }

    pub fn with_owner(mut self, owner: OwnerReference) -> Self {
        self.owner_references.push(owner);
        self
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(&self.namespace, &self.name)
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str)
    }

    /// The owner flagged as controller, if any
    pub fn controller_owner(&self) -> Option<&OwnerReference> {
        self.owner_references.iter().find(|o| o.controller)
    }

    pub fn is_owned_by(&self, uid: Uuid) -> bool {
        self.owner_references.iter().any(|o| o.uid == uid)
    }

    /// True when every selector pair is present in the labels
    pub fn matches_labels(&self, selector: &Labels) -> bool {
        selector
            .iter()
            .all(|(k, v)| self.labels.get(k).is_some_and(|actual| actual == v))
    }
}

/// A typed resource the object store can persist
pub trait Resource: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const KIND: Kind;

    fn meta(&self) -> &ObjectMeta;
    fn meta_mut(&mut self) -> &mut ObjectMeta;

    /// Controller owner reference pointing at this object
    ///
    /// Returns `None` until the store has assigned a uid.
    fn controller_reference(&self) -> Option<OwnerReference> {
        let meta = self.meta();
        meta.uid.map(|uid| OwnerReference {
            kind: Self::KIND,
            name: meta.name.clone(),
            uid,
            controller: true,
        })
    }
}

/// Implements [`Resource`] for a struct with a `metadata: ObjectMeta` field
#[macro_export]
macro_rules! impl_resource {
    ($ty:ty, $kind:expr) => {
        impl $crate::domain::meta::Resource for $ty {
            const KIND: $crate::domain::meta::Kind = $kind;

            fn meta(&self) -> &$crate::domain::meta::ObjectMeta {
                &self.metadata
            }

            fn meta_mut(&mut self) -> &mut $crate::domain::meta::ObjectMeta {
                &mut self.metadata
            }
        }
    };
}
