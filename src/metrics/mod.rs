//! Prometheus metrics for the Runner Pool Operator
//!
//! This module exposes metrics for monitoring operator health and performance.

pub mod prometheus;

pub use prometheus::*;
