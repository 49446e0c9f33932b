//! Delivers queued mutations, oldest first, through a [`SyncDelegate`].

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{oneshot, Mutex};
use tokio::time::MissedTickBehavior;

use super::queue::SyncQueue;
use crate::error::StoreError;
use crate::models::{ItemType, Operation};

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("Remote service unavailable: {0}")]
    Unavailable(String),

    #[error("Mutation rejected: {0}")]
    Rejected(String),
}

/// Sends one mutation to the remote service.
pub trait SyncDelegate: Send + Sync {
    fn deliver<'a>(
        &'a self,
        item_type: ItemType,
        operation: Operation,
        payload: &'a [u8],
    ) -> BoxFuture<'a, Result<(), DeliveryError>>;
}

/// What happens to an entry whose delivery failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Keep the entry and stop the drain; nothing later is delivered first.
    #[default]
    Retain,
    /// Remove the entry, log the loss and keep draining.
    Drop,
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailurePolicy::Retain => write!(f, "retain"),
            FailurePolicy::Drop => write!(f, "drop"),
        }
    }
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "retain" => Ok(FailurePolicy::Retain),
            "drop" => Ok(FailurePolicy::Drop),
            _ => Err(format!(
                "Invalid failure policy '{}'. Valid options: retain, drop",
                s
            )),
        }
    }
}

/// Counts from one drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub delivered: usize,
    /// Failed delivery attempts, dropped entries included.
    pub failed: usize,
    pub dropped: usize,
    /// Entries still queued when the drain finished.
    pub remaining: usize,
}

/// Period used by [`SyncProcessor::run`] unless configured otherwise.
pub const DEFAULT_DRAIN_INTERVAL: Duration = Duration::from_secs(30);

pub struct SyncProcessor<D> {
    queue: SyncQueue,
    delegate: D,
    policy: FailurePolicy,
    drain_interval: Duration,
    drain_lock: Mutex<()>,
}

impl<D: SyncDelegate> SyncProcessor<D> {
    pub fn new(queue: SyncQueue, delegate: D) -> Self {
        Self {
            queue,
            delegate,
            policy: FailurePolicy::default(),
            drain_interval: DEFAULT_DRAIN_INTERVAL,
            drain_lock: Mutex::new(()),
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_drain_interval(mut self, drain_interval: Duration) -> Self {
        self.drain_interval = drain_interval;
        self
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    pub fn drain_interval(&self) -> Duration {
        self.drain_interval
    }

    pub fn queue(&self) -> &SyncQueue {
        &self.queue
    }

    /// Delivers the queued entries in order.
    ///
    /// Entries enqueued while a drain runs wait for the next drain. A second
    /// concurrent call waits until the first has finished.
    pub async fn drain(&self) -> Result<DrainReport, StoreError> {
        let _guard = self.drain_lock.lock().await;
        let mut report = DrainReport::default();

        for entry in self.queue.entries().await? {
            let delivery = self
                .delegate
                .deliver(entry.item_type, entry.operation, &entry.payload)
                .await;

            match delivery {
                Ok(()) => {
                    self.queue.remove(entry.id).await?;
                    report.delivered += 1;
                }
                Err(e) => {
                    report.failed += 1;
                    match self.policy {
                        FailurePolicy::Retain => {
                            tracing::warn!(
                                "Delivery of {} {} {} failed, retrying later: {}",
                                entry.operation,
                                entry.item_type,
                                entry.item_id,
                                e
                            );
                            break;
                        }
                        FailurePolicy::Drop => {
                            tracing::warn!(
                                "Delivery of {} {} {} failed, dropping entry {}: {}",
                                entry.operation,
                                entry.item_type,
                                entry.item_id,
                                entry.id,
                                e
                            );
                            self.queue.remove(entry.id).await?;
                            report.dropped += 1;
                        }
                    }
                }
            }
        }

        report.remaining = self.queue.pending_count();
        tracing::debug!("Drain finished: {:?}", report);
        Ok(report)
    }

    /// [`run_periodic`](Self::run_periodic) at the configured drain interval.
    pub async fn run(&self, shutdown: oneshot::Receiver<()>) {
        self.run_periodic(self.drain_interval, shutdown).await
    }

    /// Drains every `period` until `shutdown` fires or its sender is dropped.
    pub async fn run_periodic(&self, period: Duration, mut shutdown: oneshot::Receiver<()>) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Sync processor stopped");
                    break;
                }
                _ = ticker.tick() => match self.drain().await {
                    Ok(report) if report.delivered + report.failed > 0 => {
                        tracing::info!(
                            "Delivered {} mutation(s), {} failed, {} pending",
                            report.delivered,
                            report.failed,
                            report.remaining
                        );
                    }
                    Ok(_) => {}
                    Err(e) => tracing::error!("Drain failed: {}", e),
                },
            }
        }
    }
}
