//! Change notifier: turns pool add/update events into queued reconcile tasks

use std::sync::Arc;
use std::time::Duration;

use kube::ResourceExt;
use tracing::{debug, info, warn};

use crate::crd::RunnerPool;
use crate::metrics;
use crate::mirror::LocalMirror;
use crate::queue::{QueueError, QueueSender, ReconcileTask};

/// A change observed on a mirrored object
#[derive(Clone, Debug)]
pub enum ResourceChange<K> {
    /// First observation of the object
    Added(K),
    /// A newer version of an object already in the mirror
    Updated(K),
    /// The object was removed from the cluster
    Deleted(K),
}

impl<K> ResourceChange<K> {
    /// The object carried by the change
    pub fn object(&self) -> &K {
        match self {
            ResourceChange::Added(obj)
            | ResourceChange::Updated(obj)
            | ResourceChange::Deleted(obj) => obj,
        }
    }
}

/// Pushes pool snapshots onto the work queue
#[derive(Clone, Debug)]
pub struct ChangeNotifier {
    queue: QueueSender,
}

impl ChangeNotifier {
    /// Create a notifier feeding `queue`
    pub fn new(queue: QueueSender) -> Self {
        Self { queue }
    }

    /// Handle one pool change.
    ///
    /// Deletions are not enqueued: managed pods carry an owner reference to the
    /// pool and are removed by the cluster garbage collector. The pool's metric
    /// series are dropped.
    pub fn handle(&self, change: ResourceChange<RunnerPool>) -> Result<(), QueueError> {
        match change {
            ResourceChange::Added(pool) => {
                info!(
                    namespace = pool.namespace().unwrap_or_default(),
                    name = %pool.name_any(),
                    "Observed RunnerPool added"
                );
                self.enqueue(Arc::new(pool))
            }
            ResourceChange::Updated(pool) => {
                info!(
                    namespace = pool.namespace().unwrap_or_default(),
                    name = %pool.name_any(),
                    "Observed RunnerPool updated"
                );
                self.enqueue(Arc::new(pool))
            }
            ResourceChange::Deleted(pool) => {
                let namespace = pool.namespace().unwrap_or_default();
                debug!(
                    namespace = %namespace,
                    name = %pool.name_any(),
                    "Not reconciling deleted RunnerPool, pods are garbage collected by owner reference"
                );
                metrics::forget_pool(&namespace, &pool.name_any());
                Ok(())
            }
        }
    }

    /// Enqueue every pool currently in the mirror
    pub fn resync(&self, mirror: &LocalMirror) -> usize {
        let mut queued = 0;
        for pool in mirror.pools() {
            if self.enqueue(pool).is_ok() {
                queued += 1;
            }
        }
        queued
    }

    fn enqueue(&self, pool: Arc<RunnerPool>) -> Result<(), QueueError> {
        let task = ReconcileTask::new(pool);
        let key = task.key();
        self.queue.push(task).map_err(|e| {
            warn!(pool = %key, error = %e, "Dropped reconcile task");
            e
        })
    }
}

/// Re-enqueue all mirrored pools every `interval` until the queue closes
pub async fn run_resync(notifier: ChangeNotifier, mirror: LocalMirror, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately; the initial list already produced Added events
    ticker.tick().await;

    loop {
        ticker.tick().await;
        if !mirror.has_synced() {
            continue;
        }
        let queued = notifier.resync(&mirror);
        debug!(queued = queued, "Periodic resync");
        if notifier.queue.is_closed() {
            info!("Work queue closed, stopping resync");
            return;
        }
    }
}
