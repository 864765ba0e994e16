//! Build pipeline domain types
//!
//! A [`Pipeline`] is an immutable template of ordered build stages; a
//! [`PipelineRun`] is one execution of it, reported on by the build system
//! through its `Succeeded` condition.

use serde::{Deserialize, Serialize};

use crate::domain::application::LocalObjectReference;
use crate::domain::condition::{self, Condition};
use crate::domain::meta::{Kind, ObjectMeta};
use crate::impl_resource;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    pub metadata: ObjectMeta,
    pub spec: PipelineSpec,
}

impl_resource!(Pipeline, Kind::Pipeline);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineSpec {
    pub params: Vec<ParamSpec>,
    pub workspaces: Vec<WorkspaceDeclaration>,
    pub tasks: Vec<PipelineTask>,
    #[serde(default)]
    pub results: Vec<PipelineResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceDeclaration {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub optional: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineTask {
    pub name: String,
    #[serde(default)]
    pub run_after: Vec<String>,
    pub task_ref: TaskRef,
    pub params: Vec<Param>,
    pub workspaces: Vec<WorkspaceBinding>,
}

impl PipelineTask {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.as_str())
    }
}

/// Reference to a task resolved by the build system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRef {
    pub resolver: String,
    pub params: Vec<Param>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub value: String,
}

impl Param {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceBinding {
    pub name: String,
    pub workspace: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub name: String,
    pub description: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub metadata: ObjectMeta,
    pub spec: PipelineRunSpec,
    #[serde(default)]
    pub status: PipelineRunStatus,
}

impl_resource!(PipelineRun, Kind::PipelineRun);

impl PipelineRun {
    /// The terminal condition set by the build system, if reported yet
    pub fn succeeded_condition(&self) -> Option<&Condition> {
        condition::find_condition(&self.status.conditions, condition::SUCCEEDED)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRunSpec {
    pub pipeline_ref: LocalObjectReference,
    pub params: Vec<Param>,
    pub service_account_name: String,
    pub workspaces: Vec<PipelineRunWorkspace>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRunWorkspace {
    pub name: String,
    pub source: WorkspaceSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WorkspaceSource {
    #[serde(rename_all = "camelCase")]
    VolumeClaimTemplate {
        access_mode: String,
        storage: String,
    },
    #[serde(rename_all = "camelCase")]
    Secret { secret_name: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineRunStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
}
