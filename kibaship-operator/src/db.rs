use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS objects (
            kind VARCHAR(64) NOT NULL,
            namespace VARCHAR(253) NOT NULL,
            name VARCHAR(253) NOT NULL,
            uid UUID NOT NULL UNIQUE,
            resource_version BIGINT NOT NULL,
            data JSONB NOT NULL,
            PRIMARY KEY (kind, namespace, name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Label selectors and owner lookups both query the document
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_objects_data ON objects USING GIN (data jsonb_path_ops)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_objects_kind_namespace ON objects(kind, namespace)")
        .execute(pool)
        .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
