//! Controller implementations for watching and reconciling resources

pub mod runner_pool_controller;

use std::sync::Arc;
use std::time::Duration;

use crate::adapters::cluster::ClusterApi;
use crate::adapters::registry::RunnerRegistry;
use crate::adapters::secrets::TokenCache;
use crate::config::OperatorConfig;
use crate::mirror::LocalMirror;
use crate::retry::RetryConfig;

/// Shared context for controllers
pub struct Context {
    /// Cluster reads and mutations
    pub cluster: Arc<dyn ClusterApi>,
    /// Registered runner counts
    pub registry: Arc<dyn RunnerRegistry>,
    /// Local mirror of pools and managed pods
    pub mirror: LocalMirror,
    /// Decoded registry tokens
    pub tokens: TokenCache,
    /// Retry policy for registry lookups
    pub retry: RetryConfig,
    /// Deadline for one reconcile pass
    pub pass_timeout: Duration,
    /// Interval between mirror sync checks at startup
    pub sync_poll_interval: Duration,
}

impl Context {
    /// Create a new context
    pub fn new(
        cluster: Arc<dyn ClusterApi>,
        registry: Arc<dyn RunnerRegistry>,
        mirror: LocalMirror,
        config: &OperatorConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            cluster,
            registry,
            mirror,
            tokens: TokenCache::new(config.token_cache_ttl),
            retry: RetryConfig::with_max_attempts(config.registry_retry_attempts),
            pass_timeout: config.pass_timeout,
            sync_poll_interval: config.sync_poll_interval,
        })
    }
}
