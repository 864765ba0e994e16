//! Object Store
//!
//! Declarative resource storage with optimistic concurrency, owner-based
//! garbage collection and a change stream. Backends persist raw JSON
//! documents; [`Store`] layers typed access on top.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::Utc;
use kibaship_core::domain::meta::{Kind, Labels, ObjectKey, ObjectMeta, Resource};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Capacity of the change stream buffer
pub const WATCH_CAPACITY: usize = 1024;

/// Store error type
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{kind} {key} not found")]
    NotFound { kind: Kind, key: ObjectKey },

    #[error("{kind} {key} already exists")]
    AlreadyExists { kind: Kind, key: ObjectKey },

    #[error("{kind} {key} was modified concurrently")]
    Conflict { kind: Kind, key: ObjectKey },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::AlreadyExists { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Added,
    Modified,
    Deleted,
}

/// A change observed on the store
///
/// `new` carries the object after the change (the last known state for
/// deletions); `old` is only set for modifications.
#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub kind: Kind,
    pub event_type: EventType,
    pub old: Option<Value>,
    pub new: Value,
}

impl WatchEvent {
    pub fn key(&self) -> Option<ObjectKey> {
        read_meta(&self.new).ok().map(|m| m.key())
    }
}

/// Raw storage backend
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get_raw(&self, kind: Kind, key: &ObjectKey) -> Result<Option<Value>, StoreError>;

    /// Lists objects of a kind whose labels contain every selector pair
    async fn list_raw(
        &self,
        kind: Kind,
        namespace: Option<&str>,
        selector: &Labels,
    ) -> Result<Vec<Value>, StoreError>;

    async fn create_raw(&self, kind: Kind, object: Value) -> Result<Value, StoreError>;

    /// Replaces an object; the supplied resource version must match
    async fn update_raw(&self, kind: Kind, object: Value) -> Result<Value, StoreError>;

    /// Deletes an object and everything it transitively owns
    async fn delete_raw(&self, kind: Kind, key: &ObjectKey) -> Result<bool, StoreError>;

    fn watch(&self) -> broadcast::Receiver<WatchEvent>;
}

/// Typed handle over an [`ObjectStore`] backend
#[derive(Clone)]
pub struct Store {
    backend: Arc<dyn ObjectStore>,
}

impl Store {
    pub fn new(backend: Arc<dyn ObjectStore>) -> Self {
        Self { backend }
    }

    /// In-memory store, used by tests and local runs
    pub fn memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub async fn get<T: Resource>(&self, namespace: &str, name: &str) -> Result<Option<T>, StoreError> {
        let key = ObjectKey::new(namespace, name);
        match self.backend.get_raw(T::KIND, &key).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Like [`Store::get`] but a missing object is an error
    pub async fn fetch<T: Resource>(&self, namespace: &str, name: &str) -> Result<T, StoreError> {
        self.get(namespace, name).await?.ok_or_else(|| StoreError::NotFound {
            kind: T::KIND,
            key: ObjectKey::new(namespace, name),
        })
    }

    pub async fn list<T: Resource>(
        &self,
        namespace: Option<&str>,
        selector: &Labels,
    ) -> Result<Vec<T>, StoreError> {
        self.backend
            .list_raw(T::KIND, namespace, selector)
            .await?
            .into_iter()
            .map(|value| serde_json::from_value(value).map_err(StoreError::from))
            .collect()
    }

    pub async fn create<T: Resource>(&self, object: &T) -> Result<T, StoreError> {
        let stored = self
            .backend
            .create_raw(T::KIND, serde_json::to_value(object)?)
            .await?;
        Ok(serde_json::from_value(stored)?)
    }

    /// Creates the object unless one with the same key exists
    ///
    /// Returns `true` when this call created it.
    pub async fn create_if_absent<T: Resource>(&self, object: &T) -> Result<bool, StoreError> {
        match self.create(object).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_already_exists() => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn update<T: Resource>(&self, object: &T) -> Result<T, StoreError> {
        let stored = self
            .backend
            .update_raw(T::KIND, serde_json::to_value(object)?)
            .await?;
        Ok(serde_json::from_value(stored)?)
    }

    pub async fn delete<T: Resource>(&self, namespace: &str, name: &str) -> Result<bool, StoreError> {
        self.backend
            .delete_raw(T::KIND, &ObjectKey::new(namespace, name))
            .await
    }

    pub fn watch(&self) -> broadcast::Receiver<WatchEvent> {
        self.backend.watch()
    }
}

pub(crate) fn read_meta(object: &Value) -> Result<ObjectMeta, StoreError> {
    let meta = object.get("metadata").cloned().unwrap_or(Value::Null);
    Ok(serde_json::from_value(meta)?)
}

fn write_meta(object: &mut Value, meta: &ObjectMeta) -> Result<(), StoreError> {
    if let Value::Object(map) = object {
        map.insert("metadata".to_string(), serde_json::to_value(meta)?);
    }
    Ok(())
}

/// Everything except metadata and status
fn desired_state(object: &Value) -> Value {
    match object {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(k, _)| k.as_str() != "metadata" && k.as_str() != "status")
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Stamps store-assigned metadata onto a new object
pub(crate) fn prepare_create(object: &mut Value) -> Result<ObjectMeta, StoreError> {
    let mut meta = read_meta(object)?;
    meta.uid = Some(Uuid::new_v4());
    meta.generation = 1;
    meta.resource_version = 1;
    meta.creation_timestamp = Some(Utc::now());
    write_meta(object, &meta)?;
    Ok(meta)
}

/// Carries identity forward and bumps versions for a replacement
///
/// Generation only moves when the desired state changed, so status-only
/// writes never look like a new specification.
pub(crate) fn prepare_update(
    kind: Kind,
    existing: &Value,
    object: &mut Value,
) -> Result<ObjectMeta, StoreError> {
    let current = read_meta(existing)?;
    let mut meta = read_meta(object)?;

    if meta.resource_version != current.resource_version {
        return Err(StoreError::Conflict {
            kind,
            key: current.key(),
        });
    }

    meta.uid = current.uid;
    meta.creation_timestamp = current.creation_timestamp;
    meta.resource_version = current.resource_version + 1;
    meta.generation = if desired_state(existing) != desired_state(object) {
        current.generation + 1
    } else {
        current.generation
    };

    write_meta(object, &meta)?;
    Ok(meta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_prepare_update_bumps_generation_on_spec_change_only() {
        let mut existing = json!({
            "metadata": { "name": "a", "namespace": "ns" },
            "spec": { "x": 1 },
            "status": { "phase": "Building" }
        });
        prepare_create(&mut existing).unwrap();

        let mut status_only = existing.clone();
        status_only["status"]["phase"] = json!("Deploying");
        let meta = prepare_update(Kind::Deployment, &existing, &mut status_only).unwrap();
        assert_eq!(meta.generation, 1);
        assert_eq!(meta.resource_version, 2);

        let mut spec_change = existing.clone();
        spec_change["spec"]["x"] = json!(2);
        let meta = prepare_update(Kind::Deployment, &existing, &mut spec_change).unwrap();
        assert_eq!(meta.generation, 2);
    }

    #[test]
    fn test_prepare_update_rejects_stale_version() {
        let mut existing = json!({ "metadata": { "name": "a", "namespace": "ns" } });
        prepare_create(&mut existing).unwrap();

        let mut stale = existing.clone();
        stale["metadata"]["resourceVersion"] = json!(0);
        let err = prepare_update(Kind::Secret, &existing, &mut stale).unwrap_err();
        assert!(err.is_conflict());
    }
}
