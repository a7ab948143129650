//! Owner-reference helpers tying managed pods to their RunnerPool

use std::sync::Arc;

use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::ResourceExt;

use crate::crd::{RunnerPool, API_VERSION, KIND};

/// Controller owner reference pointing at `pool`
pub fn owner_reference(pool: &RunnerPool) -> OwnerReference {
    OwnerReference {
        api_version: API_VERSION.to_string(),
        kind: KIND.to_string(),
        name: pool.name_any(),
        uid: pool.metadata.uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// True when `pod` carries an owner reference with the pool's UID and kind.
///
/// A pool without a UID (never persisted) owns nothing.
pub fn is_owned_by(pod: &Pod, pool: &RunnerPool) -> bool {
    let Some(uid) = pool.metadata.uid.as_deref() else {
        return false;
    };

    pod.owner_references()
        .iter()
        .any(|owner| owner.uid == uid && owner.kind == KIND)
}

/// Keep only the pods owned by `pool`, preserving input order
pub fn owned_pods<I>(pods: I, pool: &RunnerPool) -> Vec<Arc<Pod>>
where
    I: IntoIterator<Item = Arc<Pod>>,
{
    pods.into_iter()
        .filter(|pod| pod.namespace() == pool.namespace() && is_owned_by(pod, pool))
        .collect()
}
