//! Reconciliation logic for RunnerPool resources

use std::sync::Arc;

use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use tracing::{debug, info};

use crate::adapters::{pod_builder, secrets};
use crate::controllers::Context;
use crate::crd::RunnerPool;
use crate::metrics::prometheus::{OWNED_PODS, PODS_CREATED, PODS_DELETED, REGISTERED_RUNNERS};
use crate::reconcilers::scaling::{self, ScalingAction};
use crate::retry::retry_with_backoff_if;
use crate::{Error, Result};

const MAX_LABEL_VALUE_LEN: usize = 63;

/// Validate a RunnerPool spec
pub fn validate(pool: &RunnerPool) -> Result<()> {
    let spec = &pool.spec;

    if spec.min_runners < 0 {
        return Err(Error::ValidationError("minRunners must be >= 0".to_string()));
    }

    if spec.max_runners < spec.min_runners {
        return Err(Error::ValidationError(
            "maxRunners must be >= minRunners".to_string(),
        ));
    }

    // The pool name is stamped on its pods as a label value
    if pool.name_any().len() > MAX_LABEL_VALUE_LEN {
        return Err(Error::ValidationError(format!(
            "metadata.name must be at most {} characters",
            MAX_LABEL_VALUE_LEN
        )));
    }

    let organization = spec.organization.trim();
    if organization.is_empty() {
        return Err(Error::ValidationError(
            "organization cannot be empty".to_string(),
        ));
    }

    if organization.contains(|c: char| c == '/' || c.is_whitespace()) {
        return Err(Error::ValidationError(
            "organization must not contain '/' or whitespace".to_string(),
        ));
    }

    if spec.token_ref.name.is_empty() {
        return Err(Error::ValidationError(
            "tokenRef.name cannot be empty".to_string(),
        ));
    }

    if spec.token_ref.key.is_empty() {
        return Err(Error::ValidationError(
            "tokenRef.key cannot be empty".to_string(),
        ));
    }

    if spec.reconciliation_period().is_none() {
        return Err(Error::ValidationError(format!(
            "reconciliationPeriod '{}' must look like 30s, 5m or 1h",
            spec.reconciliation_period
        )));
    }

    let containers = spec
        .pod_template_spec
        .spec
        .as_ref()
        .map(|s| s.containers.len())
        .unwrap_or(0);
    if containers == 0 {
        return Err(Error::ValidationError(
            "podTemplateSpec.spec.containers must contain at least one container".to_string(),
        ));
    }

    Ok(())
}

/// Run one reconcile pass for `pool` and return the action taken.
///
/// Every input is read fresh: the token, the registered runner count and the
/// owned pods from the local mirror. At most one corrective action is applied.
pub async fn reconcile(pool: &RunnerPool, ctx: &Context) -> Result<ScalingAction> {
    let ns = pool.namespace().unwrap_or_default();
    let name = pool.name_any();

    debug!("Reconciling RunnerPool {}/{}", ns, name);

    validate(pool)?;

    let token = read_token(pool, ctx, &ns).await?;
    let registered = match registered_runners(pool, ctx, &token).await {
        Ok(count) => count,
        Err(e @ Error::RegistryUnauthorized(_)) => {
            ctx.tokens.invalidate(&token_key(pool, &ns)).await;
            return Err(e);
        }
        Err(e) => return Err(e),
    };

    // Completed runner pods hold no registration; they are cleared out and
    // left out of the count
    let (finished, owned): (Vec<Arc<Pod>>, Vec<Arc<Pod>>) = ctx
        .mirror
        .owned_pods(pool)
        .into_iter()
        .partition(|pod| scaling::is_finished(pod));
    remove_finished(pool, ctx, &ns, &finished).await?;

    REGISTERED_RUNNERS
        .with_label_values(&[&ns, &name])
        .set(registered as f64);
    OWNED_PODS
        .with_label_values(&[&ns, &name])
        .set(owned.len() as f64);

    let action = scaling::decide(
        pool.spec.min_runners,
        pool.spec.max_runners,
        registered,
        owned.len(),
    );

    debug!(
        "RunnerPool {}/{}: min={}, max={}, registered={}, owned={}, action={:?}",
        ns,
        name,
        pool.spec.min_runners,
        pool.spec.max_runners,
        registered,
        owned.len(),
        action
    );

    match action {
        ScalingAction::ScaleUp => scale_up(pool, ctx, &ns).await?,
        ScalingAction::ScaleDown(count) => scale_down(pool, ctx, &ns, &owned, count).await?,
        ScalingAction::None => {}
    }

    Ok(action)
}

fn token_key(pool: &RunnerPool, namespace: &str) -> secrets::TokenKey {
    (
        namespace.to_string(),
        pool.spec.token_ref.name.clone(),
        pool.spec.token_ref.key.clone(),
    )
}

async fn read_token(pool: &RunnerPool, ctx: &Context, namespace: &str) -> Result<String> {
    let token_ref = &pool.spec.token_ref;

    ctx.tokens
        .get_or_fetch(token_key(pool, namespace), || async {
            let secret = ctx.cluster.get_secret(namespace, &token_ref.name).await?;
            secrets::get_secret_key(&secret, &token_ref.key)
        })
        .await
}

async fn registered_runners(pool: &RunnerPool, ctx: &Context, token: &str) -> Result<i64> {
    let organization = pool.spec.organization.trim();
    let operation = format!("list runners for {}", organization);

    // A rejected token will not become valid by retrying
    retry_with_backoff_if(
        &ctx.retry,
        &operation,
        || ctx.registry.registered_runners(organization, token),
        |e| !matches!(e, Error::RegistryUnauthorized(_)),
    )
    .await
}

async fn scale_up(pool: &RunnerPool, ctx: &Context, namespace: &str) -> Result<()> {
    let pod = pod_builder::build_pod(pool)?;
    let created = ctx.cluster.create_pod(namespace, &pod).await?;

    PODS_CREATED
        .with_label_values(&[namespace, &pool.name_any()])
        .inc();
    info!(
        "Scaled up RunnerPool {}/{}: created Pod {}",
        namespace,
        pool.name_any(),
        created.name_any()
    );
    Ok(())
}

async fn remove_finished(
    pool: &RunnerPool,
    ctx: &Context,
    namespace: &str,
    finished: &[Arc<Pod>],
) -> Result<()> {
    let names: Vec<String> = finished
        .iter()
        .filter(|pod| !scaling::is_terminating(pod))
        .map(|pod| pod.name_any())
        .collect();
    if names.is_empty() {
        return Ok(());
    }

    ctx.cluster.delete_pods(namespace, &names).await?;
    info!(
        "RunnerPool {}/{}: removed {} finished Pod(s) {:?}",
        namespace,
        pool.name_any(),
        names.len(),
        names
    );
    Ok(())
}

async fn scale_down(
    pool: &RunnerPool,
    ctx: &Context,
    namespace: &str,
    owned: &[Arc<Pod>],
    count: usize,
) -> Result<()> {
    let victims: Vec<String> = scaling::select_for_deletion(owned, count)
        .iter()
        .map(|pod| pod.name_any())
        .collect();

    if victims.is_empty() {
        info!(
            "RunnerPool {}/{} is {} over maxRunners, excess pods already terminating",
            namespace,
            pool.name_any(),
            count
        );
        return Ok(());
    }

    ctx.cluster.delete_pods(namespace, &victims).await?;

    PODS_DELETED
        .with_label_values(&[namespace, &pool.name_any()])
        .inc_by(victims.len() as f64);
    info!(
        "Scaled down RunnerPool {}/{}: deleted {} Pod(s) {:?}",
        namespace,
        pool.name_any(),
        victims.len(),
        victims
    );
    Ok(())
}
