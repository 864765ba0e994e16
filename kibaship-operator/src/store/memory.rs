//! In-memory object store

use async_trait::async_trait;
use kibaship_core::domain::meta::{Kind, Labels, ObjectKey};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::{RwLock, broadcast};
use uuid::Uuid;

use super::{
    EventType, ObjectStore, StoreError, WATCH_CAPACITY, WatchEvent, prepare_create, prepare_update,
    read_meta,
};

type Objects = HashMap<(Kind, ObjectKey), Value>;

pub struct MemoryStore {
    objects: RwLock<Objects>,
    events: broadcast::Sender<WatchEvent>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(WATCH_CAPACITY);
        Self {
            objects: RwLock::new(HashMap::new()),
            events,
        }
    }

    fn publish(&self, kind: Kind, event_type: EventType, old: Option<Value>, new: Value) {
        // No subscribers is not an error
        let _ = self.events.send(WatchEvent {
            kind,
            event_type,
            old,
            new,
        });
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Keys of every object transitively owned by `root`
fn collect_dependents(objects: &Objects, root: Uuid) -> Vec<(Kind, ObjectKey)> {
    let mut found = Vec::new();
    let mut frontier = vec![root];

    while let Some(owner) = frontier.pop() {
        for (id, value) in objects {
            let Ok(meta) = read_meta(value) else { continue };
            if meta.is_owned_by(owner) && !found.contains(id) {
                found.push(id.clone());
                if let Some(uid) = meta.uid {
                    frontier.push(uid);
                }
            }
        }
    }

    found
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get_raw(&self, kind: Kind, key: &ObjectKey) -> Result<Option<Value>, StoreError> {
        let objects = self.objects.read().await;
        Ok(objects.get(&(kind, key.clone())).cloned())
    }

    async fn list_raw(
        &self,
        kind: Kind,
        namespace: Option<&str>,
        selector: &Labels,
    ) -> Result<Vec<Value>, StoreError> {
        let objects = self.objects.read().await;
        let mut matched: Vec<(&ObjectKey, &Value)> = objects
            .iter()
            .filter(|((k, key), _)| *k == kind && namespace.is_none_or(|ns| key.namespace == ns))
            .filter(|(_, value)| read_meta(value).is_ok_and(|m| m.matches_labels(selector)))
            .map(|((_, key), value)| (key, value))
            .collect();
        matched.sort_by(|a, b| a.0.cmp(b.0));
        Ok(matched.into_iter().map(|(_, v)| v.clone()).collect())
    }

    async fn create_raw(&self, kind: Kind, mut object: Value) -> Result<Value, StoreError> {
        let mut objects = self.objects.write().await;
        let meta = prepare_create(&mut object)?;
        let id = (kind, meta.key());

        if objects.contains_key(&id) {
            return Err(StoreError::AlreadyExists { kind, key: id.1 });
        }

        objects.insert(id, object.clone());
        drop(objects);

        self.publish(kind, EventType::Added, None, object.clone());
        Ok(object)
    }

    async fn update_raw(&self, kind: Kind, mut object: Value) -> Result<Value, StoreError> {
        let mut objects = self.objects.write().await;
        let key = read_meta(&object)?.key();
        let id = (kind, key);

        let Some(existing) = objects.get(&id).cloned() else {
            return Err(StoreError::NotFound { kind, key: id.1 });
        };

        prepare_update(kind, &existing, &mut object)?;
        objects.insert(id, object.clone());
        drop(objects);

        self.publish(kind, EventType::Modified, Some(existing), object.clone());
        Ok(object)
    }

    async fn delete_raw(&self, kind: Kind, key: &ObjectKey) -> Result<bool, StoreError> {
        let mut objects = self.objects.write().await;

        let Some(removed) = objects.remove(&(kind, key.clone())) else {
            return Ok(false);
        };

        let mut deleted = vec![(kind, removed.clone())];
        if let Some(uid) = read_meta(&removed)?.uid {
            for id in collect_dependents(&objects, uid) {
                if let Some(value) = objects.remove(&id) {
                    deleted.push((id.0, value));
                }
            }
        }
        drop(objects);

        for (kind, value) in deleted {
            self.publish(kind, EventType::Deleted, None, value);
        }
        Ok(true)
    }

    fn watch(&self) -> broadcast::Receiver<WatchEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;
    use kibaship_core::domain::meta::{ObjectMeta, Resource};
    use kibaship_core::domain::secret::Secret;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn secret(name: &str) -> Secret {
        Secret {
            metadata: ObjectMeta::new("ns", name),
            data: BTreeMap::new(),
        }
    }

    fn store() -> Store {
        Store::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_create_assigns_identity() {
        let store = store();
        let created = store.create(&secret("a")).await.unwrap();

        assert!(created.metadata.uid.is_some());
        assert_eq!(created.metadata.generation, 1);
        assert_eq!(created.metadata.resource_version, 1);
        assert!(created.metadata.creation_timestamp.is_some());

        let err = store.create(&secret("a")).await.unwrap_err();
        assert!(err.is_already_exists());
        assert!(!store.create_if_absent(&secret("a")).await.unwrap());
    }

    #[tokio::test]
    async fn test_update_is_optimistic() {
        let store = store();
        let created = store.create(&secret("a")).await.unwrap();

        let mut first = created.clone();
        first.data.insert("K".into(), "1".into());
        let updated = store.update(&first).await.unwrap();
        assert_eq!(updated.metadata.resource_version, 2);
        assert_eq!(updated.metadata.generation, 2);

        let mut stale = created;
        stale.data.insert("K".into(), "2".into());
        assert!(store.update(&stale).await.unwrap_err().is_conflict());
    }

    #[tokio::test]
    async fn test_list_filters_by_labels_and_namespace() {
        let store = store();
        let mut labelled = secret("a");
        labelled.metadata.labels.insert("team".into(), "x".into());
        store.create(&labelled).await.unwrap();
        store.create(&secret("b")).await.unwrap();

        let mut other_ns = secret("c");
        other_ns.metadata.namespace = "other".into();
        other_ns.metadata.labels.insert("team".into(), "x".into());
        store.create(&other_ns).await.unwrap();

        let mut selector = Labels::new();
        selector.insert("team".into(), "x".into());

        let in_ns: Vec<Secret> = store.list(Some("ns"), &selector).await.unwrap();
        assert_eq!(in_ns.len(), 1);
        assert_eq!(in_ns[0].metadata.name, "a");

        let everywhere: Vec<Secret> = store.list(None, &selector).await.unwrap();
        assert_eq!(everywhere.len(), 2);
    }

    #[tokio::test]
    async fn test_delete_cascades_through_owners() {
        let store = store();
        let root = store.create(&secret("root")).await.unwrap();

        let mut child = secret("child");
        child.metadata.owner_references.push(root.controller_reference().unwrap());
        let child = store.create(&child).await.unwrap();

        let mut grandchild = secret("grandchild");
        grandchild.metadata.owner_references.push(child.controller_reference().unwrap());
        store.create(&grandchild).await.unwrap();

        store.create(&secret("unrelated")).await.unwrap();

        assert!(store.delete::<Secret>("ns", "root").await.unwrap());
        assert!(store.get::<Secret>("ns", "child").await.unwrap().is_none());
        assert!(store.get::<Secret>("ns", "grandchild").await.unwrap().is_none());
        assert!(store.get::<Secret>("ns", "unrelated").await.unwrap().is_some());
        assert!(!store.delete::<Secret>("ns", "root").await.unwrap());
    }

    #[tokio::test]
    async fn test_watch_reports_changes() {
        let store = store();
        let mut events = store.watch();

        let created = store.create(&secret("a")).await.unwrap();
        let mut changed = created.clone();
        changed.data.insert("K".into(), "V".into());
        store.update(&changed).await.unwrap();

        let added = events.recv().await.unwrap();
        assert_eq!(added.event_type, EventType::Added);
        assert_eq!(added.kind, Kind::Secret);

        let modified = events.recv().await.unwrap();
        assert_eq!(modified.event_type, EventType::Modified);
        assert_eq!(modified.old.unwrap()["data"], serde_json::json!({}));
        assert_eq!(modified.new["data"]["K"], "V");
    }
}
