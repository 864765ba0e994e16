//! Event filters deciding which store changes deserve a reconcile

use kibaship_core::domain::condition::{Condition, conditions_equivalent};
use kibaship_core::domain::meta::{Kind, ObjectKey};
use serde_json::Value;

use crate::store::{EventType, WatchEvent, read_meta};

fn generation(object: &Value) -> i64 {
    read_meta(object).map(|m| m.generation).unwrap_or_default()
}

fn conditions(object: &Value) -> Vec<Condition> {
    object
        .pointer("/status/conditions")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default()
}

/// Creations and specification changes
pub fn generation_changed(event: &WatchEvent) -> bool {
    match event.event_type {
        EventType::Added => true,
        EventType::Modified => event
            .old
            .as_ref()
            .is_none_or(|old| generation(old) != generation(&event.new)),
        EventType::Deleted => false,
    }
}

/// Modifications whose conditions differ by type, status or reason
pub fn conditions_changed(event: &WatchEvent) -> bool {
    match (event.event_type, &event.old) {
        (EventType::Modified, Some(old)) => {
            !conditions_equivalent(&conditions(old), &conditions(&event.new))
        }
        _ => false,
    }
}

/// Any creation or modification
pub fn not_deleted(event: &WatchEvent) -> bool {
    event.event_type != EventType::Deleted
}

/// Key of the controlling owner when it is of `owner_kind`
pub fn controller_owner_key(event: &WatchEvent, owner_kind: Kind) -> Option<ObjectKey> {
    let meta = read_meta(&event.new).ok()?;
    let owner = meta.controller_owner()?;
    (owner.kind == owner_kind).then(|| ObjectKey::new(&meta.namespace, &owner.name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn deployment(generation: i64, conditions: Value) -> Value {
        json!({
            "metadata": { "name": "d", "namespace": "ns", "generation": generation },
            "status": { "conditions": conditions }
        })
    }

    fn modified(old: Value, new: Value) -> WatchEvent {
        WatchEvent {
            kind: Kind::Deployment,
            event_type: EventType::Modified,
            old: Some(old),
            new,
        }
    }

    fn condition(status: &str, reason: &str, message: &str) -> Value {
        json!([{
            "type": "PipelineRunReady",
            "status": status,
            "reason": reason,
            "message": message,
            "lastTransitionTime": "2025-01-01T00:00:00Z"
        }])
    }

    #[test]
    fn test_generation_changed() {
        let same = modified(deployment(1, json!([])), deployment(1, json!([])));
        assert!(!generation_changed(&same));

        let bumped = modified(deployment(1, json!([])), deployment(2, json!([])));
        assert!(generation_changed(&bumped));

        let added = WatchEvent {
            kind: Kind::Deployment,
            event_type: EventType::Added,
            old: None,
            new: deployment(1, json!([])),
        };
        assert!(generation_changed(&added));
    }

    #[test]
    fn test_message_churn_is_ignored() {
        let event = modified(
            deployment(1, condition("Unknown", "Running", "step 1")),
            deployment(1, condition("Unknown", "Running", "step 2")),
        );
        assert!(!conditions_changed(&event));

        let event = modified(
            deployment(1, condition("Unknown", "Running", "")),
            deployment(1, condition("True", "Succeeded", "")),
        );
        assert!(conditions_changed(&event));
    }

    #[test]
    fn test_controller_owner_key() {
        let event = WatchEvent {
            kind: Kind::PipelineRun,
            event_type: EventType::Modified,
            old: None,
            new: json!({
                "metadata": {
                    "name": "pipeline-run-x-1",
                    "namespace": "ns",
                    "ownerReferences": [{
                        "kind": "Deployment",
                        "name": "web",
                        "uid": "6f1c1a4e-0000-4000-8000-000000000001",
                        "controller": true
                    }]
                }
            }),
        };

        assert_eq!(controller_owner_key(&event, Kind::Deployment), Some(ObjectKey::new("ns", "web")));
        assert_eq!(controller_owner_key(&event, Kind::Application), None);
    }
}
