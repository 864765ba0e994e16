//! Status conditions
//!
//! Conditions are tri-state signals written onto a resource's status by an
//! observer. The lifecycle engine reads `PipelineRunReady` and
//! `K8sDeploymentReady` but never writes them itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Build pipeline readiness, mirrored from the pipeline run
pub const PIPELINE_RUN_READY: &str = "PipelineRunReady";
/// Compute workload readiness
pub const K8S_DEPLOYMENT_READY: &str = "K8sDeploymentReady";
/// Terminal condition carried by a pipeline run
pub const SUCCEEDED: &str = "Succeeded";

/// Reason codes used by the readiness producers
pub mod reasons {
    pub const CRASH_LOOP_BACK_OFF: &str = "CrashLoopBackOff";
    pub const DEPLOYMENT_NOT_READY: &str = "DeploymentNotReady";
    pub const PODS_NOT_READY: &str = "PodsNotReady";
    pub const PODS_READY: &str = "PodsReady";
    pub const DEPLOYING: &str = "Deploying";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionStatus::True => write!(f, "True"),
            ConditionStatus::False => write!(f, "False"),
            ConditionStatus::Unknown => write!(f, "Unknown"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: ConditionStatus,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    pub fn new(
        condition_type: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            condition_type: condition_type.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: Utc::now(),
        }
    }
}

pub fn find_condition<'a>(conditions: &'a [Condition], condition_type: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.condition_type == condition_type)
}

/// Inserts or replaces the condition of the same type
///
/// The existing transition time is kept when the status does not change.
/// Returns `false` when status, reason and message were already identical,
/// in which case nothing is modified.
pub fn set_condition(conditions: &mut Vec<Condition>, mut condition: Condition) -> bool {
    match conditions
        .iter_mut()
        .find(|c| c.condition_type == condition.condition_type)
    {
        Some(existing) => {
            if existing.status == condition.status
                && existing.reason == condition.reason
                && existing.message == condition.message
            {
                return false;
            }
            if existing.status == condition.status {
                condition.last_transition_time = existing.last_transition_time;
            }
            *existing = condition;
            true
        }
        None => {
            conditions.push(condition);
            true
        }
    }
}

/// Compares two condition lists by type, status and reason only
///
/// Messages and timestamps are churn and never trigger a reconcile.
pub fn conditions_equivalent(a: &[Condition], b: &[Condition]) -> bool {
    a.len() == b.len()
        && a.iter().zip(b).all(|(x, y)| {
            x.condition_type == y.condition_type && x.status == y.status && x.reason == y.reason
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_condition_keeps_transition_time_on_same_status() {
        let mut conditions = vec![Condition::new(K8S_DEPLOYMENT_READY, ConditionStatus::False, "PodsNotReady", "0/1")];
        let original = conditions[0].last_transition_time;

        let changed = set_condition(
            &mut conditions,
            Condition::new(K8S_DEPLOYMENT_READY, ConditionStatus::False, "PodsNotReady", "0/2"),
        );

        assert!(changed);
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].message, "0/2");
        assert_eq!(conditions[0].last_transition_time, original);
    }

    #[test]
    fn test_set_condition_reports_no_change() {
        let mut conditions = vec![Condition::new(PIPELINE_RUN_READY, ConditionStatus::Unknown, "Running", "")];
        let changed = set_condition(
            &mut conditions,
            Condition::new(PIPELINE_RUN_READY, ConditionStatus::Unknown, "Running", ""),
        );
        assert!(!changed);
    }

    #[test]
    fn test_conditions_equivalent_ignores_message() {
        let a = vec![Condition::new(PIPELINE_RUN_READY, ConditionStatus::True, "Succeeded", "one")];
        let b = vec![Condition::new(PIPELINE_RUN_READY, ConditionStatus::True, "Succeeded", "two")];
        assert!(conditions_equivalent(&a, &b));

        let c = vec![Condition::new(PIPELINE_RUN_READY, ConditionStatus::False, "Failed", "two")];
        assert!(!conditions_equivalent(&a, &c));
        assert!(!conditions_equivalent(&a, &[]));
    }
}
