//! Runner Pod builder

use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;
use std::collections::BTreeMap;

use crate::adapters::ownership::owner_reference;
use crate::crd::{RunnerPool, POOL_LABEL};
use crate::{Error, Result};

/// Build a new runner Pod for `pool` from its pod template.
///
/// The name is server-generated from the `<pool>-` prefix and the pod spec is
/// the template's, unchanged. Template labels and annotations are kept; the
/// pool label always wins.
pub fn build_pod(pool: &RunnerPool) -> Result<Pod> {
    let name = pool.name_any();
    let template = &pool.spec.pod_template_spec;

    let spec = template.spec.clone().ok_or_else(|| {
        Error::ValidationError("podTemplateSpec.spec is required".to_string())
    })?;

    let template_meta = template.metadata.clone().unwrap_or_default();
    let labels = build_labels(&name, template_meta.labels);

    Ok(Pod {
        metadata: ObjectMeta {
            generate_name: Some(format!("{}-", name)),
            namespace: pool.namespace(),
            labels: Some(labels),
            annotations: template_meta.annotations,
            owner_references: Some(vec![owner_reference(pool)]),
            ..Default::default()
        },
        spec: Some(spec),
        ..Default::default()
    })
}

fn build_labels(
    name: &str,
    template_labels: Option<BTreeMap<String, String>>,
) -> BTreeMap<String, String> {
    let mut labels = template_labels.unwrap_or_default();
    labels.insert(
        "app.kubernetes.io/managed-by".to_string(),
        "runner-pool-operator".to_string(),
    );
    labels.insert(POOL_LABEL.to_string(), name.to_string());
    labels
}
