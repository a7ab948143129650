//! Cluster API operations used by the reconciler

use async_trait::async_trait;
use futures::future::join_all;
use k8s_openapi::api::core::v1::{Pod, Secret};
use kube::api::{DeleteParams, PostParams};
use kube::{Api, Client, ResourceExt};
use tracing::{info, warn};

use crate::adapters::secrets;
use crate::{Error, Result};

/// Mutations and reads the reconciler performs against the cluster
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Create a pod, returning the stored object
    async fn create_pod(&self, namespace: &str, pod: &Pod) -> Result<Pod>;

    /// Delete the named pods. Every deletion is attempted; the first failure is returned.
    async fn delete_pods(&self, namespace: &str, names: &[String]) -> Result<()>;

    /// Read a secret
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret>;
}

/// [`ClusterApi`] backed by a kube client
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    /// Wrap a kube client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClusterApi for KubeCluster {
    async fn create_pod(&self, namespace: &str, pod: &Pod) -> Result<Pod> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let created = pods
            .create(&PostParams::default(), pod)
            .await
            .map_err(|e| Error::KubeError(format!("Failed to create Pod: {}", e)))?;

        info!("Created Pod {}/{}", namespace, created.name_any());
        Ok(created)
    }

    async fn delete_pods(&self, namespace: &str, names: &[String]) -> Result<()> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = DeleteParams::background();

        let results = join_all(names.iter().map(|name| {
            let pods = pods.clone();
            let params = params.clone();
            async move { (name, pods.delete(name, &params).await) }
        }))
        .await;

        let mut first_error = None;
        for (name, result) in results {
            match result {
                Ok(_) => info!("Deleted Pod {}/{}", namespace, name),
                // Already gone
                Err(kube::Error::Api(resp)) if resp.code == 404 => {
                    info!("Pod {}/{} already deleted", namespace, name)
                }
                Err(e) => {
                    warn!("Failed to delete Pod {}/{}: {}", namespace, name, e);
                    first_error.get_or_insert_with(|| {
                        Error::KubeError(format!("Failed to delete Pod {}: {}", name, e))
                    });
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret> {
        secrets::get_secret(&self.client, namespace, name).await
    }
}
