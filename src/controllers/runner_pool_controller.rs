//! Controller for RunnerPool resources
//!
//! Watches feed the local mirror; pool changes become reconcile tasks on a
//! bounded queue; a single worker drains the queue one pass at a time. Passes
//! are never run concurrently, so two decisions for the same pool cannot race.

use std::sync::Arc;

use k8s_openapi::api::core::v1::Pod;
use kube::{Api, Client};
use tracing::{debug, error, info, instrument, warn};

use crate::config::OperatorConfig;
use crate::controllers::Context;
use crate::crd::RunnerPool;
use crate::metrics::prometheus::{
    OPERATOR_HEALTH, RECONCILE_DURATION, RECONCILIATIONS, RECONCILIATION_ERRORS,
};
use crate::mirror::{self, LocalMirror, MirrorFeeds};
use crate::notifier::{self, ChangeNotifier};
use crate::queue::{QueueReceiver, ReconcileTask, WorkQueue};
use crate::reconcilers::runner_pool;
use crate::reconcilers::scaling::ScalingAction;
use crate::{Error, Result};

const KIND: &str = "RunnerPool";

/// Run the RunnerPool controller until a component exits
pub async fn run(ctx: Arc<Context>, client: Client, feeds: MirrorFeeds, config: OperatorConfig) {
    info!("Starting RunnerPool controller");

    let (pools, pods): (Api<RunnerPool>, Api<Pod>) = match &config.watch_namespace {
        Some(ns) => (
            Api::namespaced(client.clone(), ns),
            Api::namespaced(client, ns),
        ),
        None => (Api::all(client.clone()), Api::all(client)),
    };

    let (queue_tx, queue_rx) = WorkQueue::bounded(config.queue_capacity);
    let notifier = ChangeNotifier::new(queue_tx);

    let pool_watch = {
        let notifier = notifier.clone();
        tokio::spawn(feeds.pools.run(pools, mirror::pool_watch_config(), move |change| {
            // Rejections are logged and counted by the notifier
            let _ = notifier.handle(change);
        }))
    };
    let pod_watch = tokio::spawn(feeds.pods.run(pods, mirror::pod_watch_config(), |_| {}));
    let resync = tokio::spawn(notifier::run_resync(
        notifier,
        ctx.mirror.clone(),
        config.resync_interval,
    ));
    let worker = tokio::spawn(run_worker(ctx, queue_rx));

    tokio::select! {
        _ = pool_watch => error!("RunnerPool watch exited unexpectedly"),
        _ = pod_watch => error!("Pod watch exited unexpectedly"),
        _ = resync => error!("Resync loop exited unexpectedly"),
        _ = worker => error!("Reconcile worker exited unexpectedly"),
    }

    OPERATOR_HEALTH.set(0.0);
    info!("RunnerPool controller stopped");
}

/// Block until both mirror stores have completed their initial list
pub async fn wait_for_sync(mirror: &LocalMirror, poll_interval: std::time::Duration) {
    loop {
        let (pools, pods) = mirror.sync_status();
        if pools && pods {
            return;
        }
        info!(
            pools_synced = pools,
            pods_synced = pods,
            "Waiting for local mirror to sync"
        );
        tokio::time::sleep(poll_interval).await;
    }
}

/// Syncing, then Running: drain the queue one task at a time.
///
/// Returns only once the queue is closed and empty.
pub async fn run_worker(ctx: Arc<Context>, mut queue: QueueReceiver) {
    wait_for_sync(&ctx.mirror, ctx.sync_poll_interval).await;
    info!("Local mirror synced, reconcile worker running");

    while let Some(task) = queue.take().await {
        // Failures are logged inside; one pool never stops the others
        let _ = process(&ctx, task).await;
    }

    info!("Work queue closed, reconcile worker stopped");
}

/// Run one reconcile pass for a dequeued task under the pass deadline
#[instrument(skip(ctx, task), fields(pool = %task.key()))]
pub async fn process(ctx: &Context, task: ReconcileTask) -> Result<ScalingAction> {
    let start = std::time::Instant::now();
    let key = task.key();

    debug!(
        queued_ms = task.enqueued_at.elapsed().as_millis() as u64,
        "Dequeued reconcile task"
    );
    RECONCILIATIONS.with_label_values(&[KIND]).inc();

    let result = match tokio::time::timeout(
        ctx.pass_timeout,
        runner_pool::reconcile(&task.pool, ctx),
    )
    .await
    {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout(ctx.pass_timeout)),
    };

    let duration = start.elapsed().as_secs_f64();
    RECONCILE_DURATION
        .with_label_values(&[KIND])
        .observe(duration);

    match &result {
        Ok(ScalingAction::None) => debug!("Reconciled {} in {:.2}s, balanced", key, duration),
        Ok(action) => info!("Reconciled {} in {:.2}s: {:?}", key, duration, action),
        Err(e @ Error::ValidationError(_)) => {
            RECONCILIATION_ERRORS.with_label_values(&[KIND]).inc();
            warn!("Skipping invalid RunnerPool {}: {}", key, e);
        }
        Err(e) => {
            RECONCILIATION_ERRORS.with_label_values(&[KIND]).inc();
            error!("Failed to reconcile {}: {:?}", key, e);
        }
    }

    result
}
