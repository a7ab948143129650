//! RunnerPool Custom Resource Definition

use k8s_openapi::api::core::v1::PodTemplateSpec;
use kube::CustomResource;
use schemars::gen::SchemaGenerator;
use schemars::schema::{InstanceType, Schema, SchemaObject};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// API group of the RunnerPool resource
pub const GROUP: &str = "actions.runnerpool.dev";

/// `apiVersion` written into owner references
pub const API_VERSION: &str = "actions.runnerpool.dev/v1alpha1";

/// Resource kind
pub const KIND: &str = "RunnerPool";

/// Label carried by every managed pod, valued with the owning pool's name
pub const POOL_LABEL: &str = "actions.runnerpool.dev/pool";

/// RunnerPool resource specification
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "actions.runnerpool.dev",
    version = "v1alpha1",
    kind = "RunnerPool",
    plural = "runnerpools",
    singular = "runnerpool",
    shortname = "rp",
    namespaced,
    printcolumn = r#"{"name": "Organization", "type": "string", "jsonPath": ".spec.organization"}"#,
    printcolumn = r#"{"name": "Min", "type": "integer", "jsonPath": ".spec.minRunners"}"#,
    printcolumn = r#"{"name": "Max", "type": "integer", "jsonPath": ".spec.maxRunners"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct RunnerPoolSpec {
    /// Lower bound on registered runners
    #[serde(default)]
    pub min_runners: i32,

    /// Upper bound on registered runners
    #[serde(default = "default_max_runners")]
    pub max_runners: i32,

    /// Organization whose registered runners are counted
    pub organization: String,

    /// Informational reconcile period, e.g. `30s`, `5m`, `1h`.
    /// Reconciliation is event driven; this value is validated but not scheduled.
    #[serde(default = "default_reconciliation_period")]
    pub reconciliation_period: String,

    /// Secret holding the registry API token
    pub token_ref: TokenRef,

    /// Blueprint for runner pods
    #[schemars(schema_with = "preserve_unknown_object")]
    pub pod_template_spec: PodTemplateSpec,
}

fn default_max_runners() -> i32 {
    1
}

fn default_reconciliation_period() -> String {
    "1m".to_string()
}

/// Reference to the registry API token
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokenRef {
    /// Secret name
    pub name: String,
    /// Key in secret (default: token)
    #[serde(default = "default_token_key")]
    pub key: String,
}

fn default_token_key() -> String {
    "token".to_string()
}

impl RunnerPoolSpec {
    /// Parsed `reconciliationPeriod`, `None` when malformed
    pub fn reconciliation_period(&self) -> Option<Duration> {
        parse_period(&self.reconciliation_period)
    }
}

/// Parse `<n>s`, `<n>m` or `<n>h`
fn parse_period(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    let split = raw.find(|c: char| !c.is_ascii_digit())?;
    let (digits, unit) = raw.split_at(split);
    let value: u64 = digits.parse().ok()?;
    let secs = match unit {
        "s" => value,
        "m" => value.checked_mul(60)?,
        "h" => value.checked_mul(3600)?,
        _ => return None,
    };
    Some(Duration::from_secs(secs))
}

/// Pod templates are validated by the API server when pods are created
fn preserve_unknown_object(_: &mut SchemaGenerator) -> Schema {
    let mut schema = SchemaObject {
        instance_type: Some(InstanceType::Object.into()),
        ..Default::default()
    };
    schema.extensions.insert(
        "x-kubernetes-preserve-unknown-fields".to_string(),
        serde_json::Value::Bool(true),
    );
    Schema::Object(schema)
}
