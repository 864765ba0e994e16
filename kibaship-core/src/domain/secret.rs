//! Secret domain types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::meta::{Kind, ObjectMeta};
use crate::impl_resource;

/// Opaque key/value secret used as a workload's environment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Secret {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl_resource!(Secret, Kind::Secret);
