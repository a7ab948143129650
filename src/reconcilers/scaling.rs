//! Scaling decision for a runner pool
//!
//! Compares the desired bounds against the registered runner count and the
//! pods the pool owns. Pure and deterministic; the caller performs the action.

use std::cmp::Ordering;
use std::sync::Arc;

use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;

/// What one reconcile pass should do
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScalingAction {
    /// Create exactly one runner pod
    ScaleUp,
    /// Delete this many runner pods
    ScaleDown(usize),
    /// Pool is within bounds, or a registration is pending
    None,
}

/// Decide the action for one pass.
///
/// Scale-up only happens when every owned pod has registered
/// (`owned_pods == registered`); otherwise a pod created earlier is still
/// coming up and creating another would overshoot. Scale-down removes the
/// excess over `max_runners`. The branches are exclusive, so at most one
/// action is taken even when `min_runners > max_runners`.
pub fn decide(
    min_runners: i32,
    max_runners: i32,
    registered: i64,
    owned_pods: usize,
) -> ScalingAction {
    let min = i64::from(min_runners);
    let max = i64::from(max_runners);

    if registered < min && owned_pods as i64 == registered {
        ScalingAction::ScaleUp
    } else if registered > max {
        ScalingAction::ScaleDown((registered - max) as usize)
    } else {
        ScalingAction::None
    }
}

/// Pick pods to delete so that `count` pods end up going away, oldest first.
///
/// Pods already being deleted still host a registered runner until their grace
/// period ends, so they count toward `count` and are never picked again. Pods
/// without a creation timestamp sort after those with one; ties are broken by
/// name.
pub fn select_for_deletion(pods: &[Arc<Pod>], count: usize) -> Vec<Arc<Pod>> {
    let (terminating, mut candidates): (Vec<Arc<Pod>>, Vec<Arc<Pod>>) =
        pods.iter().cloned().partition(|pod| is_terminating(pod));

    candidates.sort_by(|a, b| oldest_first(a, b));
    candidates.truncate(count.saturating_sub(terminating.len()));
    candidates
}

/// The pod has been asked to terminate and is in its grace period
pub fn is_terminating(pod: &Pod) -> bool {
    pod.metadata.deletion_timestamp.is_some()
}

/// The pod ran to completion and no longer hosts a runner
pub fn is_finished(pod: &Pod) -> bool {
    matches!(
        pod.status.as_ref().and_then(|s| s.phase.as_deref()),
        Some("Succeeded") | Some("Failed")
    )
}

fn oldest_first(a: &Pod, b: &Pod) -> Ordering {
    let created_a = a.metadata.creation_timestamp.as_ref().map(|t| t.0);
    let created_b = b.metadata.creation_timestamp.as_ref().map(|t| t.0);

    match (created_a, created_b) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.name_any().cmp(&b.name_any()))
}
