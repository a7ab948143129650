//! Adapters between the reconciler and the cluster, registry and pod templates

pub mod cluster;
pub mod ownership;
pub mod pod_builder;
pub mod registry;
pub mod secrets;
