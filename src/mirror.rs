//! Local mirror of RunnerPool and managed Pod objects
//!
//! Two reflector stores kept current by watch streams. Reads never touch the
//! network. Each store tracks whether its initial list has completed; the
//! reconcile worker waits for both before acting so it never undercounts the
//! pods a pool already owns.

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube::runtime::reflector::{self, store::Writer, ObjectRef, Store};
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Resource};
use tracing::{info, warn};

use crate::adapters::ownership;
use crate::crd::{RunnerPool, POOL_LABEL};
use crate::notifier::ResourceChange;

/// Set once a store has received its initial list
#[derive(Clone, Debug, Default)]
pub struct SyncFlag(Arc<AtomicBool>);

impl SyncFlag {
    /// Whether the initial list has completed
    pub fn is_synced(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn mark(&self) {
        self.0.store(true, Ordering::Release);
    }
}

/// Read side of the mirror, shared by the notifier and the reconcile worker
#[derive(Clone)]
pub struct LocalMirror {
    pools: Store<RunnerPool>,
    pods: Store<Pod>,
    pools_synced: SyncFlag,
    pods_synced: SyncFlag,
}

/// Write side of the mirror, consumed by the watch tasks
pub struct MirrorFeeds {
    /// Feed for RunnerPool objects
    pub pools: Feed<RunnerPool>,
    /// Feed for managed Pods
    pub pods: Feed<Pod>,
}

impl LocalMirror {
    /// Create empty, unsynced stores and the feeds that populate them
    pub fn new() -> (Self, MirrorFeeds) {
        let pools = Feed::new();
        let pods = Feed::new();
        let mirror = Self {
            pools: pools.store.clone(),
            pods: pods.store.clone(),
            pools_synced: pools.synced.clone(),
            pods_synced: pods.synced.clone(),
        };
        (mirror, MirrorFeeds { pools, pods })
    }

    /// True once both stores have completed their initial list
    pub fn has_synced(&self) -> bool {
        self.pools_synced.is_synced() && self.pods_synced.is_synced()
    }

    /// Sync state of (pools, pods)
    pub fn sync_status(&self) -> (bool, bool) {
        (self.pools_synced.is_synced(), self.pods_synced.is_synced())
    }

    /// All mirrored pools
    pub fn pools(&self) -> Vec<Arc<RunnerPool>> {
        self.pools.state()
    }

    /// All mirrored pods
    pub fn pods(&self) -> Vec<Arc<Pod>> {
        self.pods.state()
    }

    /// Mirrored pods whose owner reference points at `pool`
    pub fn owned_pods(&self, pool: &RunnerPool) -> Vec<Arc<Pod>> {
        ownership::owned_pods(self.pods.state(), pool)
    }
}

/// Applies watch events to one store
pub struct Feed<K>
where
    K: Resource + Clone + 'static,
    K::DynamicType: Default + Eq + Hash + Clone,
{
    store: Store<K>,
    writer: Writer<K>,
    synced: SyncFlag,
}

impl<K> Feed<K>
where
    K: Resource + Clone + Debug + Send + Sync + 'static,
    K::DynamicType: Default + Eq + Hash + Clone,
{
    fn new() -> Self {
        let (store, writer) = reflector::store();
        Self {
            store,
            writer,
            synced: SyncFlag::default(),
        }
    }

    /// Apply one watch event and classify it.
    ///
    /// An apply for an object not yet in the store is `Added`, otherwise
    /// `Updated`. Init markers produce no change.
    pub fn apply(&mut self, event: watcher::Event<K>) -> Option<ResourceChange<K>> {
        let change = match &event {
            watcher::Event::Apply(obj) | watcher::Event::InitApply(obj) => {
                if self.store.get(&ObjectRef::from_obj(obj)).is_some() {
                    Some(ResourceChange::Updated(obj.clone()))
                } else {
                    Some(ResourceChange::Added(obj.clone()))
                }
            }
            watcher::Event::Delete(obj) => Some(ResourceChange::Deleted(obj.clone())),
            watcher::Event::Init | watcher::Event::InitDone => None,
        };

        self.writer.apply_watcher_event(&event);

        if matches!(event, watcher::Event::InitDone) {
            self.synced.mark();
        }

        change
    }

    /// Drive the feed from a watch stream, passing each change to `on_change`.
    ///
    /// Watch errors are logged and the stream resumes after backoff.
    pub async fn run<F>(mut self, api: Api<K>, config: watcher::Config, mut on_change: F)
    where
        K: serde::de::DeserializeOwned,
        F: FnMut(ResourceChange<K>),
    {
        let kind = K::kind(&K::DynamicType::default()).to_string();
        info!(kind = %kind, "Starting watch");

        let mut stream = watcher(api, config).default_backoff().boxed();
        while let Some(event) = stream.next().await {
            match event {
                Ok(event) => {
                    let init_done = matches!(event, watcher::Event::InitDone);
                    if let Some(change) = self.apply(event) {
                        on_change(change);
                    }
                    if init_done {
                        info!(kind = %kind, "Initial list complete");
                    }
                }
                Err(e) => warn!(kind = %kind, error = %e, "Watch error"),
            }
        }

        warn!(kind = %kind, "Watch stream ended");
    }
}

/// Watch config for managed pods: only pods carrying the pool label
pub fn pod_watch_config() -> watcher::Config {
    watcher::Config::default().labels(POOL_LABEL).any_semantic()
}

/// Watch config for pools
pub fn pool_watch_config() -> watcher::Config {
    watcher::Config::default().any_semantic()
}
