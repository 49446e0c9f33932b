//! Decides whether a store must be migrated before use.

use std::time::Duration;

use crate::error::StoreError;
use crate::store::{metadata, OpenMode, StoreLocation, StoreMetadata};

use super::catalog::SchemaCatalog;

/// Where a store stands relative to the current schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreStatus {
    /// No store exists at the location.
    Missing,
    Current(StoreMetadata),
    Outdated(StoreMetadata),
}

impl StoreStatus {
    pub fn requires_migration(&self) -> bool {
        matches!(self, StoreStatus::Outdated(_))
    }
}

pub struct VersionDetector<'a> {
    catalog: &'a SchemaCatalog,
    busy_timeout: Duration,
}

impl<'a> VersionDetector<'a> {
    pub fn new(catalog: &'a SchemaCatalog) -> Self {
        Self {
            catalog,
            busy_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }

    pub fn current_schema_version(&self) -> &str {
        &self.catalog.current().version
    }

    /// Reads the metadata of the store at `location`.
    ///
    /// Returns `Ok(None)` if there is no store. A store that exists but
    /// carries no metadata is an error.
    pub async fn stored_metadata(
        &self,
        location: &StoreLocation,
    ) -> Result<Option<StoreMetadata>, StoreError> {
        if !location.exists() {
            return Ok(None);
        }

        let pool = location.connect(OpenMode::Existing, self.busy_timeout).await?;
        let result = metadata::read(&pool).await;
        pool.close().await;

        match result? {
            Some(stored) => Ok(Some(stored)),
            None => Err(StoreError::MissingMetadata(location.path().to_path_buf())),
        }
    }

    pub async fn status(&self, location: &StoreLocation) -> Result<StoreStatus, StoreError> {
        let status = match self.stored_metadata(location).await? {
            None => StoreStatus::Missing,
            Some(stored) if stored.matches(self.catalog.current()) => StoreStatus::Current(stored),
            Some(stored) => StoreStatus::Outdated(stored),
        };
        tracing::debug!(
            "Store {} status: {:?}",
            location.path().display(),
            status
        );
        Ok(status)
    }

    /// True iff a store exists at `location` and its signature differs from
    /// the current schema's.
    pub async fn requires_migration(&self, location: &StoreLocation) -> Result<bool, StoreError> {
        Ok(self.status(location).await?.requires_migration())
    }
}

/// Version label of the schema this build expects.
///
/// # Panics
///
/// Panics if the bundled schema cannot be loaded.
pub fn current_schema_version() -> &'static str {
    &SchemaCatalog::bundled().current().version
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::create_store;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_missing_store_needs_no_migration() {
        let temp_dir = tempdir().unwrap();
        let location = StoreLocation::new(temp_dir.path().join("run.sqlite"));
        let detector = VersionDetector::new(SchemaCatalog::bundled());

        assert!(!detector.requires_migration(&location).await.unwrap());
        assert_eq!(detector.status(&location).await.unwrap(), StoreStatus::Missing);
        assert!(!location.exists());
    }

    #[tokio::test]
    async fn test_current_store_needs_no_migration() {
        let temp_dir = tempdir().unwrap();
        let location = StoreLocation::new(temp_dir.path().join("run.sqlite"));
        let catalog = SchemaCatalog::bundled();
        create_store(&location, catalog.current()).await.unwrap().close().await;

        let detector = VersionDetector::new(catalog);
        assert!(!detector.requires_migration(&location).await.unwrap());
    }

    #[tokio::test]
    async fn test_old_store_needs_migration() {
        let temp_dir = tempdir().unwrap();
        let location = StoreLocation::new(temp_dir.path().join("run.sqlite"));
        let catalog = SchemaCatalog::bundled();
        create_store(&location, catalog.version("1").unwrap())
            .await
            .unwrap()
            .close()
            .await;

        let detector = VersionDetector::new(catalog);
        assert!(detector.requires_migration(&location).await.unwrap());
        match detector.status(&location).await.unwrap() {
            StoreStatus::Outdated(stored) => assert_eq!(stored.schema_version, "1"),
            other => panic!("unexpected status {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_store_without_metadata_is_error() {
        let temp_dir = tempdir().unwrap();
        let location = StoreLocation::new(temp_dir.path().join("run.sqlite"));
        let pool = location
            .connect(OpenMode::Create, Duration::from_secs(1))
            .await
            .unwrap();
        sqlx::query("CREATE TABLE unrelated (id INTEGER)")
            .execute(&pool)
            .await
            .unwrap();
        pool.close().await;

        let detector = VersionDetector::new(SchemaCatalog::bundled());
        let err = detector.requires_migration(&location).await.unwrap_err();
        assert!(matches!(err, StoreError::MissingMetadata(_)));
    }

    #[test]
    fn test_current_schema_version() {
        assert_eq!(current_schema_version(), "3");
        let detector = VersionDetector::new(SchemaCatalog::bundled());
        assert_eq!(detector.current_schema_version(), "3");
    }
}
