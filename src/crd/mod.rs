//! Custom Resource Definitions for the Runner Pool Operator

mod runner_pool;

pub use runner_pool::*;

use kube::CustomResourceExt;

/// Generate CRD YAML manifests for all custom resources
pub fn generate_crds() -> Vec<String> {
    vec![serde_yaml::to_string(&RunnerPool::crd()).unwrap()]
}
