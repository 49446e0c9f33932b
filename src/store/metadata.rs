//! Schema metadata recorded inside every store.

use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};

use crate::error::StoreError;
use crate::schema::SchemaModel;

const SIGNATURE_KEY: &str = "schema_signature";
const VERSION_KEY: &str = "schema_version";

/// The schema facts a store carries about itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreMetadata {
    /// Structural fingerprint, compared for compatibility.
    pub schema_signature: String,
    /// Human-readable version label.
    pub schema_version: String,
}

impl StoreMetadata {
    pub fn for_schema(schema: &SchemaModel) -> Self {
        Self {
            schema_signature: schema.signature(),
            schema_version: schema.version.clone(),
        }
    }

    pub fn matches(&self, schema: &SchemaModel) -> bool {
        self.schema_signature == schema.signature()
    }
}

/// Creates every entity table of `schema` plus the metadata table, and
/// records `schema` as the store's schema.
pub async fn initialize(conn: &mut SqliteConnection, schema: &SchemaModel) -> Result<(), StoreError> {
    for statement in schema.create_statements() {
        sqlx::query(&statement).execute(&mut *conn).await?;
    }
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS store_metadata (key TEXT PRIMARY KEY NOT NULL, value TEXT NOT NULL)",
    )
    .execute(&mut *conn)
    .await?;
    write(conn, &StoreMetadata::for_schema(schema)).await
}

pub async fn write(conn: &mut SqliteConnection, metadata: &StoreMetadata) -> Result<(), StoreError> {
    for (key, value) in [
        (SIGNATURE_KEY, &metadata.schema_signature),
        (VERSION_KEY, &metadata.schema_version),
    ] {
        sqlx::query("INSERT OR REPLACE INTO store_metadata (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

/// Reads the metadata of an open store.
///
/// Returns `Ok(None)` when the store has no metadata table or the table is
/// incomplete.
pub async fn read(pool: &SqlitePool) -> Result<Option<StoreMetadata>, StoreError> {
    let table: Option<(String,)> = sqlx::query_as(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'store_metadata'",
    )
    .fetch_optional(pool)
    .await?;
    if table.is_none() {
        return Ok(None);
    }

    let rows: Vec<(String, String)> = sqlx::query_as("SELECT key, value FROM store_metadata")
        .fetch_all(pool)
        .await?;

    let lookup = |key: &str| {
        rows.iter()
            .find(|(k, _)| k == key)
            .map(|(_, value)| value.clone())
    };

    match (lookup(SIGNATURE_KEY), lookup(VERSION_KEY)) {
        (Some(schema_signature), Some(schema_version)) => Ok(Some(StoreMetadata {
            schema_signature,
            schema_version,
        })),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaCatalog;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_read_without_table_is_none() {
        let pool = memory_pool().await;
        assert_eq!(read(&pool).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_initialize_records_schema() {
        let pool = memory_pool().await;
        let schema = SchemaCatalog::bundled().current();

        let mut conn = pool.acquire().await.unwrap();
        initialize(&mut conn, schema).await.unwrap();
        drop(conn);

        let metadata = read(&pool).await.unwrap().unwrap();
        assert_eq!(metadata, StoreMetadata::for_schema(schema));
        assert!(metadata.matches(schema));

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();
        let names: Vec<&str> = tables.iter().map(|t| t.0.as_str()).collect();
        assert_eq!(
            names,
            vec!["friends", "run_sessions", "store_metadata", "sync_queue", "users"]
        );
    }

    #[tokio::test]
    async fn test_incomplete_metadata_is_none() {
        let pool = memory_pool().await;
        sqlx::query("CREATE TABLE store_metadata (key TEXT PRIMARY KEY NOT NULL, value TEXT NOT NULL)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO store_metadata (key, value) VALUES ('schema_version', '3')")
            .execute(&pool)
            .await
            .unwrap();
        assert_eq!(read(&pool).await.unwrap(), None);
    }
}
