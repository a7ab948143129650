//! Reconciliation logic: the scaling decision and the reconcile pass

pub mod runner_pool;
pub mod scaling;
