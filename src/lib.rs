//! Runner Pool Kubernetes Operator
//!
//! This operator keeps a pool of ephemeral CI runner pods sized to the number
//! of runners registered with an external runner registry, driven by the
//! `RunnerPool` Custom Resource Definition.

pub mod adapters;
pub mod config;
pub mod controllers;
pub mod crd;
pub mod error;
pub mod metrics;
pub mod mirror;
pub mod notifier;
pub mod queue;
pub mod reconcilers;
pub mod retry;

pub use error::{Error, Result};
