//! The persisted queue of mutations waiting for delivery.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use sqlx::SqliteConnection;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use uuid::Uuid;

use super::payload;
use crate::db::{self, Direction, Entity, FetchRequest, Repository};
use crate::error::StoreError;
use crate::models::{Friend, ItemType, Operation, RunSession, SyncQueueEntry, User};
use crate::schema::AttributeType;
use crate::store::StoreContext;
use crate::value;

/// A record type whose mutations can be queued.
pub trait SyncItem: Serialize {
    const ITEM_TYPE: ItemType;

    fn item_id(&self) -> Uuid;
}

impl SyncItem for User {
    const ITEM_TYPE: ItemType = ItemType::User;

    fn item_id(&self) -> Uuid {
        self.id
    }
}

impl SyncItem for RunSession {
    const ITEM_TYPE: ItemType = ItemType::RunSession;

    fn item_id(&self) -> Uuid {
        self.id
    }
}

impl SyncItem for Friend {
    const ITEM_TYPE: ItemType = ItemType::Friend;

    fn item_id(&self) -> Uuid {
        self.id
    }
}

/// A mutation to queue. The queue assigns the entry id and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingMutation {
    pub item_id: Uuid,
    pub item_type: ItemType,
    pub operation: Operation,
    pub payload: Vec<u8>,
}

impl PendingMutation {
    pub fn new(item_id: Uuid, item_type: ItemType, operation: Operation, payload: Vec<u8>) -> Self {
        Self {
            item_id,
            item_type,
            operation,
            payload,
        }
    }

    /// A mutation of `item` with the item serialized as its payload.
    pub fn for_item<T: SyncItem>(item: &T, operation: Operation) -> Result<Self, StoreError> {
        Ok(Self::new(
            item.item_id(),
            T::ITEM_TYPE,
            operation,
            payload::encode(item)?,
        ))
    }
}

/// FIFO queue of [`SyncQueueEntry`] rows.
///
/// Entries are ordered by `created_at`, then `id`. Within one process every
/// enqueued entry gets a strictly later timestamp than the one before it.
#[derive(Clone)]
pub struct SyncQueue {
    context: StoreContext,
    clock: Arc<Mutex<Option<DateTime<Utc>>>>,
    pending: Arc<watch::Sender<usize>>,
}

impl SyncQueue {
    pub async fn open(context: StoreContext) -> Result<Self, StoreError> {
        let (count, latest) = context
            .perform(|pool| async move {
                let mut conn = pool.acquire().await?;
                let count = db::count::<SyncQueueEntry>(&mut *conn).await?;
                let latest = latest_timestamp(&mut *conn).await?;
                Ok((count, latest))
            })
            .await?;

        tracing::debug!("Sync queue opened with {} pending entries", count);
        let (pending, _) = watch::channel(count as usize);
        Ok(Self {
            context,
            clock: Arc::new(Mutex::new(latest)),
            pending: Arc::new(pending),
        })
    }

    pub async fn enqueue(&self, mutation: PendingMutation) -> Result<SyncQueueEntry, StoreError> {
        let clock = self.clock.clone();
        let (entry, count) = self
            .context
            .perform(move |pool| async move {
                let entry = SyncQueueEntry {
                    id: Uuid::new_v4(),
                    item_id: mutation.item_id,
                    item_type: mutation.item_type,
                    operation: mutation.operation,
                    created_at: next_timestamp(&clock),
                    payload: mutation.payload,
                };
                let mut conn = pool.acquire().await?;
                db::upsert(&mut *conn, &entry).await?;
                let count = db::count::<SyncQueueEntry>(&mut *conn).await?;
                Ok((entry, count))
            })
            .await?;

        tracing::debug!(
            "Queued {} {} {} as {}",
            entry.operation,
            entry.item_type,
            entry.item_id,
            entry.id
        );
        self.pending.send_replace(count as usize);
        Ok(entry)
    }

    /// Every entry, oldest first.
    pub async fn entries(&self) -> Result<Vec<SyncQueueEntry>, StoreError> {
        let request = FetchRequest::new()
            .order_by("created_at", Direction::Ascending)
            .order_by("id", Direction::Ascending);
        Repository::<SyncQueueEntry>::new(self.context.clone())
            .fetch_all(request)
            .await
    }

    /// Removes the entry with `id`. Returns false if it was not queued.
    pub async fn remove(&self, id: Uuid) -> Result<bool, StoreError> {
        let (removed, count) = self
            .context
            .perform(move |pool| async move {
                let mut conn = pool.acquire().await?;
                let result = sqlx::query("DELETE FROM sync_queue WHERE id = ?")
                    .bind(id.to_string())
                    .execute(&mut *conn)
                    .await?;
                let count = db::count::<SyncQueueEntry>(&mut *conn).await?;
                Ok((result.rows_affected() > 0, count))
            })
            .await?;

        self.pending.send_replace(count as usize);
        Ok(removed)
    }

    /// Number of queued entries, as of the last completed queue operation.
    pub fn pending_count(&self) -> usize {
        *self.pending.borrow()
    }

    /// Receives the pending count every time it is published.
    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.pending.subscribe()
    }
}

/// Current time, or one nanosecond past the previous timestamp if the
/// clock has not moved forward since.
fn next_timestamp(clock: &Mutex<Option<DateTime<Utc>>>) -> DateTime<Utc> {
    let mut last = match clock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    let now = value::now();
    let next = match *last {
        Some(previous) if now <= previous => previous + ChronoDuration::nanoseconds(1),
        _ => now,
    };
    *last = Some(next);
    next
}

async fn latest_timestamp(conn: &mut SqliteConnection) -> Result<Option<DateTime<Utc>>, StoreError> {
    let (latest,): (Option<String>,) = sqlx::query_as("SELECT MAX(created_at) FROM sync_queue")
        .fetch_one(conn)
        .await?;
    latest
        .map(|raw| {
            DateTime::parse_from_rfc3339(&raw)
                .map(|date| date.with_timezone(&Utc))
                .map_err(|_| {
                    StoreError::invalid_value(
                        SyncQueueEntry::NAME,
                        "created_at",
                        AttributeType::Date,
                    )
                })
        })
        .transpose()
}
