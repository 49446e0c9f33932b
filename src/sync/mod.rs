//! Offline sync: the persisted mutation queue and the processor that drains it.
//!
//! Mutations made while the remote service is unreachable are queued as
//! [`SyncQueueEntry`](crate::models::SyncQueueEntry) rows and delivered later,
//! strictly oldest first, through a caller-supplied [`SyncDelegate`].

pub mod payload;
mod processor;
mod queue;

pub use processor::{
    DeliveryError, DrainReport, FailurePolicy, SyncDelegate, SyncProcessor, DEFAULT_DRAIN_INTERVAL,
};
pub use queue::{PendingMutation, SyncItem, SyncQueue};
