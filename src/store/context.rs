//! The background execution context every store operation runs on.
//!
//! A context owns the store's only connection and a single tokio task. Jobs
//! are queued on a channel and run one at a time, in submission order; each
//! delivers exactly one result back to its caller.

use futures::future::{BoxFuture, FutureExt};
use sqlx::SqlitePool;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use crate::error::StoreError;
use crate::schema::SchemaModel;

use super::location::{OpenMode, StoreLocation};
use super::metadata;

type Job = Box<dyn FnOnce(SqlitePool) -> BoxFuture<'static, ()> + Send>;

enum Message {
    Run(Job),
    Shutdown(oneshot::Sender<()>),
}

struct Inner {
    location: StoreLocation,
    jobs: mpsc::UnboundedSender<Message>,
}

/// Handle to an open store. Cheap to clone; all clones share one worker.
#[derive(Clone)]
pub struct StoreContext {
    inner: Arc<Inner>,
}

impl StoreContext {
    /// Opens the store at `location`, creating it from `schema` if missing.
    ///
    /// An existing store must already be at `schema`; this never migrates.
    pub async fn open(
        location: StoreLocation,
        schema: &SchemaModel,
        busy_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let fresh = !location.exists();
        let pool = location.connect(OpenMode::Create, busy_timeout).await?;

        if fresh {
            if let Err(e) = initialize(&pool, schema).await {
                pool.close().await;
                location.remove_all()?;
                return Err(e);
            }
            tracing::info!(
                "Created store at {} (schema {})",
                location.path().display(),
                schema.version
            );
        } else {
            let stored = match metadata::read(&pool).await {
                Ok(stored) => stored,
                Err(e) => {
                    pool.close().await;
                    return Err(e);
                }
            };
            match stored {
                Some(stored) if stored.matches(schema) => {}
                Some(_) => {
                    pool.close().await;
                    return Err(StoreError::MigrationRequired {
                        path: location.path().to_path_buf(),
                        current: schema.version.clone(),
                    });
                }
                None => {
                    pool.close().await;
                    return Err(StoreError::MissingMetadata(location.path().to_path_buf()));
                }
            }
        }

        let (jobs, receiver) = mpsc::unbounded_channel();
        tokio::spawn(run_worker(pool, receiver));

        Ok(Self {
            inner: Arc::new(Inner { location, jobs }),
        })
    }

    pub fn location(&self) -> &StoreLocation {
        &self.inner.location
    }

    /// Runs `work` on the store's worker and returns its result.
    ///
    /// Work must not call back into `perform` on the same context: the
    /// worker is busy with it and the nested job would never start.
    pub async fn perform<T, F, Fut>(&self, work: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(SqlitePool) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, StoreError>> + Send + 'static,
    {
        let (reply, result) = oneshot::channel();
        let job: Job = Box::new(move |pool| {
            async move {
                let _ = reply.send(work(pool).await);
            }
            .boxed()
        });

        self.inner
            .jobs
            .send(Message::Run(job))
            .map_err(|_| StoreError::Closed)?;
        result.await.map_err(|_| StoreError::Closed)?
    }

    /// Stops accepting work, finishes every queued job, then closes the
    /// connection. Closing an already closed context is a no-op.
    pub async fn close(&self) -> Result<(), StoreError> {
        let (done, closed) = oneshot::channel();
        if self.inner.jobs.send(Message::Shutdown(done)).is_err() {
            return Ok(());
        }
        closed.await.map_err(|_| StoreError::Closed)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.jobs.is_closed()
    }
}

async fn initialize(pool: &SqlitePool, schema: &SchemaModel) -> Result<(), StoreError> {
    let mut tx = pool.begin().await?;
    metadata::initialize(&mut *tx, schema).await?;
    tx.commit().await?;
    Ok(())
}

async fn run_worker(pool: SqlitePool, mut jobs: mpsc::UnboundedReceiver<Message>) {
    let mut waiting = Vec::new();
    while let Some(message) = jobs.recv().await {
        match message {
            Message::Run(job) => job(pool.clone()).await,
            Message::Shutdown(reply) => {
                // Jobs already queued still run; recv yields them, then None.
                jobs.close();
                waiting.push(reply);
            }
        }
    }

    pool.close().await;
    tracing::debug!("Store worker stopped");
    for reply in waiting {
        let _ = reply.send(());
    }
}

/// Creates a store at `location` holding `schema`'s tables and metadata.
pub async fn create_store(
    location: &StoreLocation,
    schema: &SchemaModel,
) -> Result<SqlitePool, StoreError> {
    let pool = location
        .connect(OpenMode::Create, Duration::from_secs(5))
        .await?;
    initialize(&pool, schema).await?;
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaCatalog;
    use tempfile::tempdir;

    fn current() -> &'static SchemaModel {
        SchemaCatalog::bundled().current()
    }

    #[tokio::test]
    async fn test_open_creates_store() {
        let temp_dir = tempdir().unwrap();
        let location = StoreLocation::new(temp_dir.path().join("run.sqlite"));

        let context = StoreContext::open(location.clone(), current(), Duration::from_secs(1))
            .await
            .unwrap();
        let count: i64 = context
            .perform(|pool| async move {
                let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
                    .fetch_one(&pool)
                    .await?;
                Ok(count)
            })
            .await
            .unwrap();
        assert_eq!(count, 0);
        context.close().await.unwrap();

        assert!(location.exists());
    }

    #[tokio::test]
    async fn test_jobs_run_in_submission_order() {
        let temp_dir = tempdir().unwrap();
        let location = StoreLocation::new(temp_dir.path().join("run.sqlite"));
        let context = StoreContext::open(location, current(), Duration::from_secs(1))
            .await
            .unwrap();

        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut handles = Vec::new();
        for i in 0..10 {
            let order = order.clone();
            let pending = context.perform(move |_pool| async move {
                order.lock().unwrap().push(i);
                Ok(i)
            });
            handles.push(pending);
        }
        let results = futures::future::join_all(handles).await;

        let results: Vec<i32> = results.into_iter().map(Result::unwrap).collect();
        assert_eq!(results, (0..10).collect::<Vec<_>>());
        assert_eq!(*order.lock().unwrap(), (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_perform_after_close_fails() {
        let temp_dir = tempdir().unwrap();
        let location = StoreLocation::new(temp_dir.path().join("run.sqlite"));
        let context = StoreContext::open(location, current(), Duration::from_secs(1))
            .await
            .unwrap();

        context.close().await.unwrap();
        assert!(context.is_closed());
        assert!(context.close().await.is_ok());

        let err = context.perform(|_pool| async { Ok(()) }).await.unwrap_err();
        assert!(matches!(err, StoreError::Closed));
    }

    #[tokio::test]
    async fn test_open_outdated_store_requires_migration() {
        let temp_dir = tempdir().unwrap();
        let location = StoreLocation::new(temp_dir.path().join("run.sqlite"));
        let v1 = SchemaCatalog::bundled().version("1").unwrap();
        create_store(&location, v1).await.unwrap().close().await;

        let result = StoreContext::open(location, current(), Duration::from_secs(1)).await;
        assert!(matches!(
            result,
            Err(StoreError::MigrationRequired { ref current, .. }) if current == "3"
        ));
    }
}
