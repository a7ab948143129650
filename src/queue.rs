//! Bounded FIFO work queue between the change notifier and the reconcile worker
//!
//! Overflow policy: `push` never blocks. When the queue is full the task is
//! rejected with [`QueueError::Full`] and counted; the pool is picked up again by
//! its next change event or by the periodic resync. The watch stream feeding the
//! notifier is therefore never back-pressured by a slow reconcile.
//!
//! There is no deduplication. Several tasks for the same pool may be queued and
//! each is reconciled in turn against fresh cluster and registry state.

use std::sync::Arc;
use std::time::Instant;

use kube::ResourceExt;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::crd::RunnerPool;
use crate::metrics::prometheus::{QUEUE_DEPTH, QUEUE_DROPPED};

/// One queued reconcile request: the pool snapshot taken at enqueue time
#[derive(Clone, Debug)]
pub struct ReconcileTask {
    /// Pool snapshot the worker will act on
    pub pool: Arc<RunnerPool>,
    /// When the task was queued
    pub enqueued_at: Instant,
}

impl ReconcileTask {
    /// Wrap a pool snapshot
    pub fn new(pool: Arc<RunnerPool>) -> Self {
        Self {
            pool,
            enqueued_at: Instant::now(),
        }
    }

    /// `namespace/name` of the pool
    pub fn key(&self) -> String {
        format!(
            "{}/{}",
            self.pool.namespace().unwrap_or_default(),
            self.pool.name_any()
        )
    }
}

/// Reasons a push is rejected
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    /// Queue is at capacity
    #[error("work queue is full (capacity {0})")]
    Full(usize),
    /// Consumer has gone away
    #[error("work queue is closed")]
    Closed,
}

/// Constructor for a bounded work queue
pub struct WorkQueue;

impl WorkQueue {
    /// Create a queue holding at most `capacity` pending tasks
    pub fn bounded(capacity: usize) -> (QueueSender, QueueReceiver) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (QueueSender { tx }, QueueReceiver { rx })
    }
}

/// Producer half; cheap to clone
#[derive(Clone, Debug)]
pub struct QueueSender {
    tx: mpsc::Sender<ReconcileTask>,
}

impl QueueSender {
    /// Enqueue without waiting
    pub fn push(&self, task: ReconcileTask) -> Result<(), QueueError> {
        match self.tx.try_send(task) {
            Ok(()) => {
                QUEUE_DEPTH.set(self.len() as f64);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                QUEUE_DROPPED.inc();
                Err(QueueError::Full(self.tx.max_capacity()))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(QueueError::Closed),
        }
    }

    /// Number of tasks currently waiting
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    /// True when nothing is waiting
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True once the consumer has been dropped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer half, owned by the single reconcile worker
#[derive(Debug)]
pub struct QueueReceiver {
    rx: mpsc::Receiver<ReconcileTask>,
}

impl QueueReceiver {
    /// Wait for the next task; `None` once every sender is dropped and the queue is drained
    pub async fn take(&mut self) -> Option<ReconcileTask> {
        let task = self.rx.recv().await;
        QUEUE_DEPTH.set(self.rx.len() as f64);
        task
    }
}
