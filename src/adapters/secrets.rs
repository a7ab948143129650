//! Kubernetes secret fetching utilities

use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};

use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client};
use tokio::sync::RwLock;
use tracing::debug;

use crate::{Error, Result};

/// Fetch a secret by name from the given namespace
pub async fn get_secret(client: &Client, namespace: &str, name: &str) -> Result<Secret> {
    let secrets: Api<Secret> = Api::namespaced(client.clone(), namespace);
    secrets
        .get(name)
        .await
        .map_err(|e| Error::KubeError(format!("Failed to get secret {}: {}", name, e)))
}

/// Get a specific key from a secret as trimmed UTF-8 text.
///
/// `data` values arrive base64-encoded on the wire and are decoded during
/// deserialization; `stringData` is not consulted because the API server never
/// returns it.
pub fn get_secret_key(secret: &Secret, key: &str) -> Result<String> {
    let data = secret
        .data
        .as_ref()
        .ok_or_else(|| Error::SecretError("Secret has no data".to_string()))?;

    let value = data
        .get(key)
        .ok_or_else(|| Error::SecretError(format!("Key '{}' not found in secret", key)))?;

    let text = String::from_utf8(value.0.clone())
        .map_err(|e| Error::SecretError(format!("Invalid UTF-8 in secret key '{}': {}", key, e)))?;

    let token = text.trim();
    if token.is_empty() {
        return Err(Error::SecretError(format!("Key '{}' is empty", key)));
    }
    Ok(token.to_string())
}

/// Cache key: (namespace, secret name, key)
pub type TokenKey = (String, String, String);

/// Short-lived cache of decoded tokens.
///
/// A zero TTL disables caching and every lookup calls the fetcher.
#[derive(Debug)]
pub struct TokenCache {
    ttl: Duration,
    entries: RwLock<HashMap<TokenKey, (String, Instant)>>,
}

impl TokenCache {
    /// Create a cache with the given entry lifetime
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Return a fresh cached token or fetch and store a new one
    pub async fn get_or_fetch<F, Fut>(&self, key: TokenKey, fetch: F) -> Result<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String>>,
    {
        if self.ttl.is_zero() {
            return fetch().await;
        }

        {
            let entries = self.entries.read().await;
            if let Some((token, fetched_at)) = entries.get(&key) {
                if fetched_at.elapsed() < self.ttl {
                    return Ok(token.clone());
                }
            }
        }

        debug!(namespace = %key.0, secret = %key.1, "Refreshing cached token");
        let token = fetch().await?;
        self.entries
            .write()
            .await
            .insert(key, (token.clone(), Instant::now()));
        Ok(token)
    }

    /// Drop a cached token, e.g. after the registry rejected it
    pub async fn invalidate(&self, key: &TokenKey) {
        self.entries.write().await.remove(key);
    }
}
