//! Shared fixtures and in-memory fakes for integration tests

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use k8s_openapi::api::core::v1::{
    Container, Pod, PodSpec, PodStatus, PodTemplateSpec, Secret,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use k8s_openapi::ByteString;
use kube::runtime::watcher;
use kube::ResourceExt;

use runner_pool_operator::adapters::cluster::ClusterApi;
use runner_pool_operator::adapters::ownership::owner_reference;
use runner_pool_operator::adapters::registry::RunnerRegistry;
use runner_pool_operator::config::OperatorConfig;
use runner_pool_operator::controllers::Context;
use runner_pool_operator::crd::{RunnerPool, RunnerPoolSpec, TokenRef, POOL_LABEL};
use runner_pool_operator::mirror::{Feed, LocalMirror, MirrorFeeds};
use runner_pool_operator::{Error, Result};

pub const NAMESPACE: &str = "ci";
pub const TOKEN_SECRET: &str = "runner-token";
pub const TOKEN_KEY: &str = "token";
pub const TOKEN_VALUE: &str = "ghp_test_token";

// ============================================================================
// Fixtures
// ============================================================================

pub fn pod_template() -> PodTemplateSpec {
    let mut labels = BTreeMap::new();
    labels.insert("app".to_string(), "runner".to_string());

    PodTemplateSpec {
        metadata: Some(ObjectMeta {
            labels: Some(labels),
            ..Default::default()
        }),
        spec: Some(PodSpec {
            containers: vec![Container {
                name: "runner".to_string(),
                image: Some("ghcr.io/actions/actions-runner:latest".to_string()),
                ..Default::default()
            }],
            ..Default::default()
        }),
    }
}

pub fn pool_spec(min: i32, max: i32) -> RunnerPoolSpec {
    RunnerPoolSpec {
        min_runners: min,
        max_runners: max,
        organization: "acme".to_string(),
        reconciliation_period: "1m".to_string(),
        token_ref: TokenRef {
            name: TOKEN_SECRET.to_string(),
            key: TOKEN_KEY.to_string(),
        },
        pod_template_spec: pod_template(),
    }
}

pub fn pool(name: &str, min: i32, max: i32) -> RunnerPool {
    let mut pool = RunnerPool::new(name, pool_spec(min, max));
    pool.metadata.namespace = Some(NAMESPACE.to_string());
    pool.metadata.uid = Some(format!("uid-{}", name));
    pool
}

/// A pod owned by `pool`, created `age_secs` after a fixed epoch
pub fn owned_pod(pool: &RunnerPool, name: &str, created_secs: i64) -> Pod {
    let mut labels = BTreeMap::new();
    labels.insert(POOL_LABEL.to_string(), pool.name_any());

    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: pool.namespace(),
            uid: Some(format!("pod-{}", name)),
            labels: Some(labels),
            owner_references: Some(vec![owner_reference(pool)]),
            creation_timestamp: Some(Time(
                Utc.timestamp_opt(1_700_000_000 + created_secs, 0).unwrap(),
            )),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// A pod in the pool's namespace with no owner reference
pub fn stray_pod(name: &str) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(NAMESPACE.to_string()),
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn token_secret(value: &str) -> Secret {
    let mut data = BTreeMap::new();
    data.insert(TOKEN_KEY.to_string(), ByteString(value.as_bytes().to_vec()));

    Secret {
        metadata: ObjectMeta {
            name: Some(TOKEN_SECRET.to_string()),
            namespace: Some(NAMESPACE.to_string()),
            ..Default::default()
        },
        data: Some(data),
        ..Default::default()
    }
}

// ============================================================================
// Fake cluster
// ============================================================================

/// In-memory cluster. Created and deleted pods are written through to the
/// local mirror's pod feed, as the watch transport would do.
pub struct FakeCluster {
    feed: Mutex<Feed<Pod>>,
    live: Mutex<BTreeMap<String, Pod>>,
    secrets: Mutex<BTreeMap<(String, String), Secret>>,
    counter: AtomicUsize,
    pub created: Mutex<Vec<Pod>>,
    pub deleted: Mutex<Vec<String>>,
    pub secret_reads: AtomicUsize,
    pub fail_create: AtomicBool,
}

impl FakeCluster {
    pub fn new(feed: Feed<Pod>) -> Self {
        Self {
            feed: Mutex::new(feed),
            live: Mutex::new(BTreeMap::new()),
            secrets: Mutex::new(BTreeMap::new()),
            counter: AtomicUsize::new(0),
            created: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
            secret_reads: AtomicUsize::new(0),
            fail_create: AtomicBool::new(false),
        }
    }

    pub fn add_secret(&self, secret: Secret) {
        let key = (secret.namespace().unwrap_or_default(), secret.name_any());
        self.secrets.lock().unwrap().insert(key, secret);
    }

    /// Put an existing pod into the cluster and the mirror
    pub fn seed_pod(&self, pod: Pod) {
        self.live
            .lock()
            .unwrap()
            .insert(pod.name_any(), pod.clone());
        self.feed
            .lock()
            .unwrap()
            .apply(watcher::Event::Apply(pod));
    }

    /// End the grace period of every terminating pod
    pub fn finish_termination(&self) {
        let gone: Vec<Pod> = {
            let mut live = self.live.lock().unwrap();
            let names: Vec<String> = live
                .values()
                .filter(|pod| pod.metadata.deletion_timestamp.is_some())
                .map(|pod| pod.name_any())
                .collect();
            names.iter().filter_map(|name| live.remove(name)).collect()
        };
        let mut feed = self.feed.lock().unwrap();
        for pod in gone {
            feed.apply(watcher::Event::Delete(pod));
        }
    }

    /// Move a pod to a terminal phase, as when its runner exits
    pub fn set_phase(&self, name: &str, phase: &str) {
        let updated = self.live.lock().unwrap().get_mut(name).map(|pod| {
            pod.status = Some(PodStatus {
                phase: Some(phase.to_string()),
                ..Default::default()
            });
            pod.clone()
        });
        if let Some(pod) = updated {
            self.feed
                .lock()
                .unwrap()
                .apply(watcher::Event::Apply(pod));
        }
    }

    pub fn mark_synced(&self) {
        self.feed.lock().unwrap().apply(watcher::Event::InitDone);
    }

    pub fn created_count(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    pub fn deleted_names(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn create_pod(&self, namespace: &str, pod: &Pod) -> Result<Pod> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(Error::KubeError("create refused".to_string()));
        }

        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let mut pod = pod.clone();
        let prefix = pod.metadata.generate_name.clone().unwrap_or_default();
        pod.metadata.name = Some(format!("{}{:05}", prefix, n));
        pod.metadata.namespace = Some(namespace.to_string());
        pod.metadata.uid = Some(format!("created-{}", n));
        pod.metadata.creation_timestamp = Some(Time(Utc::now()));

        self.seed_pod(pod.clone());
        self.created.lock().unwrap().push(pod.clone());
        Ok(pod)
    }

    /// Deleted pods stay in the cluster with a deletion timestamp until
    /// [`FakeCluster::finish_termination`] is called, as during a grace period
    async fn delete_pods(&self, _namespace: &str, names: &[String]) -> Result<()> {
        for name in names {
            let terminating = self.live.lock().unwrap().get_mut(name).map(|pod| {
                if pod.metadata.deletion_timestamp.is_none() {
                    pod.metadata.deletion_timestamp = Some(Time(Utc::now()));
                }
                pod.clone()
            });
            if let Some(pod) = terminating {
                self.feed
                    .lock()
                    .unwrap()
                    .apply(watcher::Event::Apply(pod));
            }
            self.deleted.lock().unwrap().push(name.clone());
        }
        Ok(())
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret> {
        self.secret_reads.fetch_add(1, Ordering::SeqCst);
        self.secrets
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| Error::KubeError(format!("secrets \"{}\" not found", name)))
    }
}

// ============================================================================
// Fake registry
// ============================================================================

/// Scriptable runner registry
pub struct FakeRegistry {
    count: AtomicI64,
    failures: Mutex<usize>,
    pub calls: AtomicUsize,
    pub unauthorized: AtomicBool,
    pub hang: AtomicBool,
    pub tokens_seen: Mutex<Vec<String>>,
}

impl FakeRegistry {
    pub fn new(count: i64) -> Self {
        Self {
            count: AtomicI64::new(count),
            failures: Mutex::new(0),
            calls: AtomicUsize::new(0),
            unauthorized: AtomicBool::new(false),
            hang: AtomicBool::new(false),
            tokens_seen: Mutex::new(Vec::new()),
        }
    }

    pub fn set_count(&self, count: i64) {
        self.count.store(count, Ordering::SeqCst);
    }

    /// Fail the next `n` calls with a transient error
    pub fn fail_next(&self, n: usize) {
        *self.failures.lock().unwrap() = n;
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RunnerRegistry for FakeRegistry {
    async fn registered_runners(&self, _organization: &str, token: &str) -> Result<i64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.tokens_seen.lock().unwrap().push(token.to_string());

        if self.hang.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }

        if self.unauthorized.load(Ordering::SeqCst) {
            return Err(Error::RegistryUnauthorized("HTTP 401".to_string()));
        }

        {
            let mut failures = self.failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(Error::RegistryError("HTTP 502".to_string()));
            }
        }

        Ok(self.count.load(Ordering::SeqCst))
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub ctx: Arc<Context>,
    pub cluster: Arc<FakeCluster>,
    pub registry: Arc<FakeRegistry>,
    pub mirror: LocalMirror,
    pub pools: Feed<RunnerPool>,
}

impl Harness {
    pub fn new(registered: i64) -> Self {
        Self::with_config(registered, OperatorConfig::default())
    }

    pub fn with_config(registered: i64, config: OperatorConfig) -> Self {
        let (mirror, MirrorFeeds { pools, pods }) = LocalMirror::new();

        let cluster = Arc::new(FakeCluster::new(pods));
        cluster.add_secret(token_secret(TOKEN_VALUE));
        let registry = Arc::new(FakeRegistry::new(registered));

        let ctx = Context::new(cluster.clone(), registry.clone(), mirror.clone(), &config);

        Self {
            ctx,
            cluster,
            registry,
            mirror,
            pools,
        }
    }

    /// Complete the initial list on both mirror stores
    pub fn mark_synced(&mut self) {
        self.pools.apply(watcher::Event::InitDone);
        self.cluster.mark_synced();
    }
}
