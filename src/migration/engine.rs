//! Whole-store migration to the current schema.
//!
//! Records are read from the existing store, converted through a
//! [`MappingModel`] and written into a staging store next to it. Only a
//! complete, closed staging store is swapped in; any failure before that
//! leaves the original files as they were.

use sqlx::SqlitePool;
use std::time::Duration;

use super::error::MigrationError;
use super::mapping::{MappingModel, TransformRegistry};
use super::swap::{replace_store, SwapStrategy};
use crate::schema::{SchemaCatalog, SchemaModel, StoreStatus, VersionDetector};
use crate::store::{metadata, OpenMode, StoreLocation};
use crate::value::{self, bind_value, Record};

/// Suffix of the staging store written during a migration.
pub const STAGING_SUFFIX: &str = ".migrating";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// Nothing exists at the location yet.
    NoStore,
    UpToDate,
    Migrated {
        from: String,
        to: String,
        records: usize,
    },
}

pub struct MigrationEngine<'a> {
    catalog: &'a SchemaCatalog,
    registry: &'a TransformRegistry,
    swap_strategy: SwapStrategy,
    busy_timeout: Duration,
}

impl<'a> MigrationEngine<'a> {
    pub fn new(catalog: &'a SchemaCatalog, registry: &'a TransformRegistry) -> Self {
        Self {
            catalog,
            registry,
            swap_strategy: SwapStrategy::default(),
            busy_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_swap_strategy(mut self, swap_strategy: SwapStrategy) -> Self {
        self.swap_strategy = swap_strategy;
        self
    }

    pub fn with_busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }

    /// Brings the store at `location` to the current schema.
    ///
    /// The store must not be open anywhere else while this runs.
    pub async fn migrate_if_needed(
        &self,
        location: &StoreLocation,
    ) -> Result<MigrationOutcome, MigrationError> {
        let detector = VersionDetector::new(self.catalog).with_busy_timeout(self.busy_timeout);
        let stored = match detector.status(location).await? {
            StoreStatus::Missing => return Ok(MigrationOutcome::NoStore),
            StoreStatus::Current(_) => return Ok(MigrationOutcome::UpToDate),
            StoreStatus::Outdated(stored) => stored,
        };

        let destination = self.catalog.current();
        let source = self
            .catalog
            .find_by_signature(&stored.schema_signature)
            .ok_or_else(|| MigrationError::MappingModelNotFound {
                signature: stored.schema_signature.clone(),
                version: stored.schema_version.clone(),
            })?;
        let mapping = MappingModel::resolve(source, destination, self.registry)?;

        tracing::info!(
            "Migrating store {} from schema {} to {}",
            location.path().display(),
            source.version,
            destination.version
        );

        let staging = location.sibling(STAGING_SUFFIX);
        // Leftovers from an interrupted attempt.
        staging.remove_all()?;

        let records = match self
            .write_staging(location, &staging, source, destination, &mapping)
            .await
        {
            Ok(records) => records,
            Err(e) => {
                tracing::error!("Migration of {} failed: {}", location.path().display(), e);
                if let Err(cleanup) = staging.remove_all() {
                    tracing::warn!(
                        "Failed to remove staging store {}: {}",
                        staging.path().display(),
                        cleanup
                    );
                }
                return Err(e);
            }
        };

        replace_store(location, &staging, self.swap_strategy, self.busy_timeout).await?;

        tracing::info!(
            "Migrated {} record(s) to schema {}",
            records,
            destination.version
        );
        Ok(MigrationOutcome::Migrated {
            from: source.version.clone(),
            to: destination.version.clone(),
            records,
        })
    }

    async fn write_staging(
        &self,
        location: &StoreLocation,
        staging: &StoreLocation,
        source: &SchemaModel,
        destination: &SchemaModel,
        mapping: &MappingModel,
    ) -> Result<usize, MigrationError> {
        let source_pool = location
            .connect(OpenMode::Existing, self.busy_timeout)
            .await?;
        let staging_pool = match staging.connect(OpenMode::Create, self.busy_timeout).await {
            Ok(pool) => pool,
            Err(e) => {
                source_pool.close().await;
                return Err(e.into());
            }
        };

        let result = copy_records(&source_pool, &staging_pool, source, destination, mapping).await;

        source_pool.close().await;
        staging_pool.close().await;
        result
    }
}

/// Converts every mapped record into the staging store. Tables, records and
/// metadata are committed in one transaction.
async fn copy_records(
    source_pool: &SqlitePool,
    staging_pool: &SqlitePool,
    source: &SchemaModel,
    destination: &SchemaModel,
    mapping: &MappingModel,
) -> Result<usize, MigrationError> {
    let now = value::now();
    let mut tx = staging_pool.begin().await?;
    metadata::initialize(&mut *tx, destination).await?;

    let mut total = 0;
    for entity in &mapping.entities {
        let (Some(from), Some(to)) = (
            source.entity(&entity.source_entity),
            destination.entity(&entity.destination_entity),
        ) else {
            continue;
        };

        let select = format!("SELECT {} FROM {}", from.column_names().join(", "), from.table);
        let rows = sqlx::query(&select).fetch_all(source_pool).await?;
        let insert = to.insert_sql();

        for row in &rows {
            let record = Record::from_row(from, row)?;
            let migrated = entity.apply(&record, to, now)?;

            let mut query = sqlx::query(&insert);
            for attribute in &to.attributes {
                query = bind_value(query, migrated.get(&attribute.name));
            }
            query.execute(&mut *tx).await?;
        }

        tracing::debug!(
            "Migrated {} {} record(s) into {}",
            rows.len(),
            entity.source_entity,
            entity.destination_entity
        );
        total += rows.len();
    }

    tx.commit().await?;
    sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
        .execute(staging_pool)
        .await?;
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::create_store;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_missing_store_is_not_migrated() {
        let temp_dir = tempdir().unwrap();
        let location = StoreLocation::new(temp_dir.path().join("run.sqlite"));
        let registry = TransformRegistry::bundled();
        let engine = MigrationEngine::new(SchemaCatalog::bundled(), &registry);

        assert_eq!(
            engine.migrate_if_needed(&location).await.unwrap(),
            MigrationOutcome::NoStore
        );
        assert!(!location.exists());
    }

    #[tokio::test]
    async fn test_current_store_is_not_touched() {
        let temp_dir = tempdir().unwrap();
        let location = StoreLocation::new(temp_dir.path().join("run.sqlite"));
        let catalog = SchemaCatalog::bundled();
        create_store(&location, catalog.current()).await.unwrap().close().await;
        let registry = TransformRegistry::bundled();

        let outcome = MigrationEngine::new(catalog, &registry)
            .migrate_if_needed(&location)
            .await
            .unwrap();
        assert_eq!(outcome, MigrationOutcome::UpToDate);
        assert!(!location.sibling(STAGING_SUFFIX).exists());
    }

    #[tokio::test]
    async fn test_empty_old_store_migrates() {
        let temp_dir = tempdir().unwrap();
        let location = StoreLocation::new(temp_dir.path().join("run.sqlite"));
        let catalog = SchemaCatalog::bundled();
        create_store(&location, catalog.version("2").unwrap())
            .await
            .unwrap()
            .close()
            .await;
        let registry = TransformRegistry::bundled();

        let outcome = MigrationEngine::new(catalog, &registry)
            .migrate_if_needed(&location)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            MigrationOutcome::Migrated {
                from: "2".to_string(),
                to: "3".to_string(),
                records: 0
            }
        );
        assert!(!location.sibling(STAGING_SUFFIX).exists());
    }

    #[tokio::test]
    async fn test_stale_staging_store_is_replaced() {
        let temp_dir = tempdir().unwrap();
        let location = StoreLocation::new(temp_dir.path().join("run.sqlite"));
        let catalog = SchemaCatalog::bundled();
        create_store(&location, catalog.version("1").unwrap())
            .await
            .unwrap()
            .close()
            .await;
        std::fs::write(location.sibling(STAGING_SUFFIX).path(), b"garbage").unwrap();
        let registry = TransformRegistry::bundled();

        let outcome = MigrationEngine::new(catalog, &registry)
            .migrate_if_needed(&location)
            .await
            .unwrap();
        assert!(matches!(outcome, MigrationOutcome::Migrated { .. }));
    }
}
