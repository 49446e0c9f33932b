//! The local store: files on disk, schema metadata and the open store handle.

mod context;
mod location;
pub(crate) mod metadata;

pub use context::{create_store, StoreContext};
pub use location::{OpenMode, StoreLocation};
pub use metadata::StoreMetadata;

use std::time::Duration;
use thiserror::Error;

use crate::db::{Entity, Repository};
use crate::error::{ErrorClass, StoreError};
use crate::migration::{
    MigrationEngine, MigrationError, MigrationOutcome, SwapStrategy, TransformRegistry,
};
use crate::models::{Friend, RunSession, User};
use crate::schema::SchemaCatalog;
use crate::sync::SyncQueue;

/// Tunables for opening a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    pub busy_timeout: Duration,
    pub swap_strategy: SwapStrategy,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_secs(5),
            swap_strategy: SwapStrategy::default(),
        }
    }
}

#[derive(Error, Debug)]
pub enum OpenError {
    #[error(transparent)]
    Migration(#[from] MigrationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl OpenError {
    pub fn class(&self) -> ErrorClass {
        match self {
            OpenError::Migration(e) => e.class(),
            OpenError::Store(e) => e.class(),
        }
    }
}

/// An open, current store.
///
/// Opening migrates an outdated store first, so every repository handed out
/// by a `Store` works against the current schema.
pub struct Store {
    context: StoreContext,
    queue: SyncQueue,
}

impl Store {
    /// Opens the store at `location`, creating it if missing and migrating
    /// it if it was written by an older schema.
    pub async fn open(location: StoreLocation, options: &StoreOptions) -> Result<Self, OpenError> {
        let registry = TransformRegistry::bundled();
        Self::open_with(location, options, SchemaCatalog::bundled(), &registry).await
    }

    /// Like [`Store::open`], but fails with `StoreNotFound` instead of
    /// creating a new store.
    pub async fn open_existing(
        location: StoreLocation,
        options: &StoreOptions,
    ) -> Result<Self, OpenError> {
        if !location.exists() {
            return Err(StoreError::StoreNotFound(location.path().to_path_buf()).into());
        }
        Self::open(location, options).await
    }

    pub async fn open_with(
        location: StoreLocation,
        options: &StoreOptions,
        catalog: &SchemaCatalog,
        registry: &TransformRegistry,
    ) -> Result<Self, OpenError> {
        let engine = MigrationEngine::new(catalog, registry)
            .with_swap_strategy(options.swap_strategy)
            .with_busy_timeout(options.busy_timeout);
        match engine.migrate_if_needed(&location).await? {
            MigrationOutcome::Migrated { from, to, records } => tracing::info!(
                "Store upgraded from schema {} to {} ({} records)",
                from,
                to,
                records
            ),
            outcome => tracing::debug!("No migration needed: {:?}", outcome),
        }

        let context = StoreContext::open(location, catalog.current(), options.busy_timeout).await?;
        let queue = match SyncQueue::open(context.clone()).await {
            Ok(queue) => queue,
            Err(e) => {
                context.close().await?;
                return Err(e.into());
            }
        };

        Ok(Self { context, queue })
    }

    pub fn users(&self) -> Repository<User> {
        self.repository()
    }

    pub fn run_sessions(&self) -> Repository<RunSession> {
        self.repository()
    }

    pub fn friends(&self) -> Repository<Friend> {
        self.repository()
    }

    pub fn repository<E: Entity>(&self) -> Repository<E> {
        Repository::new(self.context.clone())
    }

    pub fn sync_queue(&self) -> &SyncQueue {
        &self.queue
    }

    pub fn context(&self) -> &StoreContext {
        &self.context
    }

    pub fn location(&self) -> &StoreLocation {
        self.context.location()
    }

    /// Finishes queued work and closes the store. Afterwards the files may be
    /// migrated or reopened.
    pub async fn close(self) -> Result<(), StoreError> {
        self.context.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_open_creates_current_store() {
        let temp_dir = tempdir().unwrap();
        let location = StoreLocation::new(temp_dir.path().join("run.sqlite"));

        let store = Store::open(location.clone(), &StoreOptions::default())
            .await
            .unwrap();
        assert_eq!(store.location(), &location);
        assert_eq!(store.sync_queue().pending_count(), 0);
        store.close().await.unwrap();

        let status = crate::schema::VersionDetector::new(SchemaCatalog::bundled())
            .status(&location)
            .await
            .unwrap();
        assert!(matches!(status, crate::schema::StoreStatus::Current(_)));
    }

    #[tokio::test]
    async fn test_open_existing_requires_store() {
        let temp_dir = tempdir().unwrap();
        let location = StoreLocation::new(temp_dir.path().join("absent.sqlite"));

        let err = Store::open_existing(location.clone(), &StoreOptions::default())
            .await
            .err()
            .unwrap();
        assert_eq!(err.class(), ErrorClass::NotFound);
        assert!(!location.exists());
    }

    #[tokio::test]
    async fn test_open_migrates_old_store() {
        let temp_dir = tempdir().unwrap();
        let location = StoreLocation::new(temp_dir.path().join("run.sqlite"));
        let v1 = SchemaCatalog::bundled().version("1").unwrap();
        let pool = create_store(&location, v1).await.unwrap();
        sqlx::query("INSERT INTO users (id, username, avatar_url) VALUES (?, ?, NULL)")
            .bind(uuid::Uuid::new_v4().to_string())
            .bind("ann")
            .execute(&pool)
            .await
            .unwrap();
        pool.close().await;

        let store = Store::open(location, &StoreOptions::default()).await.unwrap();
        let users = store
            .users()
            .fetch_all(crate::db::FetchRequest::new().filter(
                "username",
                crate::db::Comparison::Eq,
                Value::String("ann".to_string()),
            ))
            .await
            .unwrap();
        assert_eq!(users.len(), 1);
        store.close().await.unwrap();
    }
}
