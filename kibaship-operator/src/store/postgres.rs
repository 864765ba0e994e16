//! Postgres-backed object store
//!
//! Objects live as JSONB documents in a single `objects` table keyed by
//! kind, namespace and name. The resource version column is the
//! optimistic-concurrency token. Change events are published in-process
//! after each committed write.

use async_trait::async_trait;
use kibaship_core::domain::meta::{Kind, Labels, ObjectKey};
use serde_json::Value;
use sqlx::PgPool;
use sqlx::types::Json;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::{
    EventType, ObjectStore, StoreError, WATCH_CAPACITY, WatchEvent, prepare_create, prepare_update,
    read_meta,
};

pub struct PgStore {
    pool: PgPool,
    events: broadcast::Sender<WatchEvent>,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        let (events, _) = broadcast::channel(WATCH_CAPACITY);
        Self { pool, events }
    }

    fn publish(&self, kind: Kind, event_type: EventType, old: Option<Value>, new: Value) {
        let _ = self.events.send(WatchEvent {
            kind,
            event_type,
            old,
            new,
        });
    }
}

#[derive(sqlx::FromRow)]
struct ObjectRow {
    kind: String,
    data: Json<Value>,
}

#[async_trait]
impl ObjectStore for PgStore {
    async fn get_raw(&self, kind: Kind, key: &ObjectKey) -> Result<Option<Value>, StoreError> {
        let row = sqlx::query_as::<_, ObjectRow>(
            r#"
            SELECT kind, data
            FROM objects
            WHERE kind = $1 AND namespace = $2 AND name = $3
            "#,
        )
        .bind(kind.as_str())
        .bind(&key.namespace)
        .bind(&key.name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.data.0))
    }

    async fn list_raw(
        &self,
        kind: Kind,
        namespace: Option<&str>,
        selector: &Labels,
    ) -> Result<Vec<Value>, StoreError> {
        let rows = sqlx::query_as::<_, ObjectRow>(
            r#"
            SELECT kind, data
            FROM objects
            WHERE kind = $1
              AND ($2::TEXT IS NULL OR namespace = $2)
              AND data->'metadata'->'labels' @> $3
            ORDER BY namespace, name
            "#,
        )
        .bind(kind.as_str())
        .bind(namespace)
        .bind(Json(selector))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.data.0).collect())
    }

    async fn create_raw(&self, kind: Kind, mut object: Value) -> Result<Value, StoreError> {
        let meta = prepare_create(&mut object)?;

        let result = sqlx::query(
            r#"
            INSERT INTO objects (kind, namespace, name, uid, resource_version, data)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (kind, namespace, name) DO NOTHING
            "#,
        )
        .bind(kind.as_str())
        .bind(&meta.namespace)
        .bind(&meta.name)
        .bind(meta.uid)
        .bind(meta.resource_version)
        .bind(Json(&object))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::AlreadyExists {
                kind,
                key: meta.key(),
            });
        }

        self.publish(kind, EventType::Added, None, object.clone());
        Ok(object)
    }

    async fn update_raw(&self, kind: Kind, mut object: Value) -> Result<Value, StoreError> {
        let key = read_meta(&object)?.key();
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query_as::<_, ObjectRow>(
            r#"
            SELECT kind, data
            FROM objects
            WHERE kind = $1 AND namespace = $2 AND name = $3
            FOR UPDATE
            "#,
        )
        .bind(kind.as_str())
        .bind(&key.namespace)
        .bind(&key.name)
        .fetch_optional(&mut *tx)
        .await?
        .map(|r| r.data.0)
        .ok_or_else(|| StoreError::NotFound {
            kind,
            key: key.clone(),
        })?;

        let meta = prepare_update(kind, &existing, &mut object)?;

        sqlx::query(
            r#"
            UPDATE objects
            SET resource_version = $1, data = $2
            WHERE kind = $3 AND namespace = $4 AND name = $5
            "#,
        )
        .bind(meta.resource_version)
        .bind(Json(&object))
        .bind(kind.as_str())
        .bind(&key.namespace)
        .bind(&key.name)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.publish(kind, EventType::Modified, Some(existing), object.clone());
        Ok(object)
    }

    async fn delete_raw(&self, kind: Kind, key: &ObjectKey) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        let root = sqlx::query_as::<_, ObjectRow>(
            r#"
            DELETE FROM objects
            WHERE kind = $1 AND namespace = $2 AND name = $3
            RETURNING kind, data
            "#,
        )
        .bind(kind.as_str())
        .bind(&key.namespace)
        .bind(&key.name)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(root) = root else {
            return Ok(false);
        };

        let mut deleted = vec![root];
        let mut frontier: Vec<Uuid> = read_meta(&deleted[0].data.0)?.uid.into_iter().collect();

        while let Some(owner) = frontier.pop() {
            let owned = serde_json::json!([{ "uid": owner }]);
            let rows = sqlx::query_as::<_, ObjectRow>(
                r#"
                DELETE FROM objects
                WHERE data->'metadata'->'ownerReferences' @> $1
                RETURNING kind, data
                "#,
            )
            .bind(Json(owned))
            .fetch_all(&mut *tx)
            .await?;

            for row in rows {
                if let Some(uid) = read_meta(&row.data.0)?.uid {
                    frontier.push(uid);
                }
                deleted.push(row);
            }
        }

        tx.commit().await?;

        for row in deleted {
            if let Some(kind) = Kind::parse(&row.kind) {
                self.publish(kind, EventType::Deleted, None, row.data.0);
            }
        }
        Ok(true)
    }

    fn watch(&self) -> broadcast::Receiver<WatchEvent> {
        self.events.subscribe()
    }
}
