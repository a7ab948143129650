//! Runner registry client
//!
//! Reads the number of runners registered under an organization from a
//! GitHub-compatible REST API (`GET /orgs/{org}/actions/runners`).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use crate::{Error, Result};

/// Source of registered runner counts
#[async_trait]
pub trait RunnerRegistry: Send + Sync {
    /// Number of runners currently registered under `organization`
    async fn registered_runners(&self, organization: &str, token: &str) -> Result<i64>;
}

/// A registered runner as reported by the registry
#[derive(Clone, Debug, Deserialize)]
pub struct Runner {
    /// Registry-assigned id
    #[serde(default)]
    pub id: Option<i64>,
    /// Runner name
    #[serde(default)]
    pub name: Option<String>,
    /// `online` or `offline`
    #[serde(default)]
    pub status: Option<String>,
    /// Whether the runner is executing a job
    #[serde(default)]
    pub busy: Option<bool>,
}

/// Response of the runner listing endpoint
#[derive(Clone, Debug, Deserialize)]
pub struct RunnerList {
    /// Total registered runners, independent of pagination
    #[serde(alias = "totalCount")]
    pub total_count: i64,
    /// The page of runners returned with this response
    #[serde(default)]
    pub runners: Vec<Runner>,
}

/// HTTP client for a GitHub-compatible runner registry
#[derive(Clone, Debug)]
pub struct GitHubRegistry {
    client: reqwest::Client,
    base_url: String,
}

impl GitHubRegistry {
    /// Create a client against `base_url` with a per-request timeout
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("runner-pool-operator/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self::with_client(client, base_url))
    }

    /// Create a client with a custom HTTP client
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Full runner listing for `organization`
    pub async fn list_runners(&self, organization: &str, token: &str) -> Result<RunnerList> {
        let url = format!("{}/orgs/{}/actions/runners", self.base_url, organization);
        debug!(url = %url, "Fetching registered runners");

        let response = self
            .client
            .get(&url)
            .header(AUTHORIZATION, format!("token {}", token))
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| Error::RegistryError(format!("request to {} failed: {}", url, e)))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(Error::RegistryUnauthorized(format!(
                "HTTP {} from {}",
                status, url
            )));
        }
        if !status.is_success() {
            return Err(Error::RegistryError(format!("HTTP {} from {}", status, url)));
        }

        response
            .json::<RunnerList>()
            .await
            .map_err(|e| Error::RegistryError(format!("invalid response from {}: {}", url, e)))
    }
}

#[async_trait]
impl RunnerRegistry for GitHubRegistry {
    async fn registered_runners(&self, organization: &str, token: &str) -> Result<i64> {
        let list = self.list_runners(organization, token).await?;
        if list.total_count < 0 {
            return Err(Error::RegistryError(format!(
                "negative total_count {} for {}",
                list.total_count, organization
            )));
        }
        Ok(list.total_count)
    }
}
