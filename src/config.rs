//! Operator configuration read from the environment

use std::str::FromStr;
use std::time::Duration;

use crate::{Error, Result};

/// Default registry base URL
pub const DEFAULT_REGISTRY_URL: &str = "https://api.github.com";

/// Runtime settings for the operator
#[derive(Clone, Debug)]
pub struct OperatorConfig {
    /// Port for `/metrics`, `/healthz` and `/readyz`
    pub metrics_port: u16,
    /// Restrict watches to one namespace; all namespaces when `None`
    pub watch_namespace: Option<String>,
    /// Base URL of the runner registry API
    pub registry_url: String,
    /// Work queue capacity
    pub queue_capacity: usize,
    /// Interval between mirror sync checks at startup
    pub sync_poll_interval: Duration,
    /// Interval at which every mirrored pool is re-enqueued
    pub resync_interval: Duration,
    /// Deadline for one reconcile pass
    pub pass_timeout: Duration,
    /// Per-request timeout for registry calls
    pub registry_timeout: Duration,
    /// Attempts per registry lookup within one pass
    pub registry_retry_attempts: u32,
    /// Token cache lifetime; zero re-reads the secret on every pass
    pub token_cache_ttl: Duration,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            metrics_port: 8080,
            watch_namespace: None,
            registry_url: DEFAULT_REGISTRY_URL.to_string(),
            queue_capacity: 1024,
            sync_poll_interval: Duration::from_secs(1),
            resync_interval: Duration::from_secs(60),
            pass_timeout: Duration::from_secs(120),
            registry_timeout: Duration::from_secs(10),
            registry_retry_attempts: 3,
            token_cache_ttl: Duration::ZERO,
        }
    }
}

impl OperatorConfig {
    /// Build the configuration from process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let queue_capacity = parse_or(&lookup, "QUEUE_CAPACITY", defaults.queue_capacity)?;
        if queue_capacity == 0 {
            return Err(Error::ConfigError("QUEUE_CAPACITY must be >= 1".to_string()));
        }

        let registry_retry_attempts = parse_or(
            &lookup,
            "REGISTRY_RETRY_ATTEMPTS",
            defaults.registry_retry_attempts,
        )?;
        if registry_retry_attempts == 0 {
            return Err(Error::ConfigError(
                "REGISTRY_RETRY_ATTEMPTS must be >= 1".to_string(),
            ));
        }

        let sync_poll_interval = secs_or(
            &lookup,
            "SYNC_POLL_INTERVAL_SECS",
            defaults.sync_poll_interval,
        )?;
        if sync_poll_interval.is_zero() {
            return Err(Error::ConfigError(
                "SYNC_POLL_INTERVAL_SECS must be >= 1".to_string(),
            ));
        }

        let resync_interval = secs_or(&lookup, "RESYNC_INTERVAL_SECS", defaults.resync_interval)?;
        if resync_interval.is_zero() {
            return Err(Error::ConfigError(
                "RESYNC_INTERVAL_SECS must be >= 1".to_string(),
            ));
        }

        Ok(Self {
            metrics_port: parse_or(&lookup, "METRICS_PORT", defaults.metrics_port)?,
            watch_namespace: lookup("WATCH_NAMESPACE").filter(|ns| !ns.is_empty()),
            registry_url: lookup("RUNNER_REGISTRY_URL")
                .filter(|url| !url.is_empty())
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.registry_url),
            queue_capacity,
            sync_poll_interval,
            resync_interval,
            pass_timeout: secs_or(&lookup, "PASS_TIMEOUT_SECS", defaults.pass_timeout)?,
            registry_timeout: secs_or(
                &lookup,
                "REGISTRY_TIMEOUT_SECS",
                defaults.registry_timeout,
            )?,
            registry_retry_attempts,
            token_cache_ttl: secs_or(&lookup, "TOKEN_CACHE_TTL_SECS", defaults.token_cache_ttl)?,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::ConfigError(format!("Invalid value for {}: {}", key, e))),
        None => Ok(default),
    }
}

fn secs_or<F>(lookup: &F, key: &str, default: Duration) -> Result<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    parse_or(lookup, key, default.as_secs()).map(Duration::from_secs)
}
