//! CRD YAML Generator
//!
//! This binary generates the Kubernetes CRD manifest for the RunnerPool
//! resource managed by the runner-pool-operator.
//!
//! Usage: cargo run --bin crdgen > deploy/crds/runnerpool.yaml

use runner_pool_operator::crd::generate_crds;

fn main() {
    for crd in generate_crds() {
        println!("---");
        print!("{}", crd);
    }
}
