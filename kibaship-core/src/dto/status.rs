//! Status reports from the build system and the runtime

use serde::{Deserialize, Serialize};

use crate::domain::condition::ConditionStatus;

/// Terminal condition of a pipeline run as reported by the build system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRunReport {
    pub status: ConditionStatus,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
}
