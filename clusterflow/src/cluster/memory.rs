//! In-process cluster backend.
//!
//! Stores resources in a map and publishes change events on a broadcast
//! channel. Status progressions can be scripted per resource so watches and
//! workflows can be exercised without an API server.

use super::{
    ChangeType, EventStream, EventSubscription, JobCounts, Manifest, PodPhase, Resource,
    ResourceEvent, ResourceStatus, ResourceStore,
};
use crate::core::ResourceKind;
use crate::errors::ClusterError;
use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::debug;

type ResourceKey = (ResourceKind, String, String);

const EVENT_BUFFER: usize = 256;

/// A scripted status change applied some time after creation.
pub type ScriptStep = (Duration, ResourceStatus);

struct Inner {
    resources: Mutex<BTreeMap<ResourceKey, Resource>>,
    scripts: Mutex<HashMap<(ResourceKind, String), Vec<ScriptStep>>>,
    created: Mutex<Vec<(ResourceKind, String)>>,
    failing_kinds: Mutex<HashSet<ResourceKind>>,
    events: broadcast::Sender<ResourceEvent>,
    failing_reads: AtomicUsize,
    refuse_subscriptions: AtomicBool,
    reads: AtomicUsize,
    subscriptions_opened: AtomicUsize,
    subscriptions_active: Arc<AtomicUsize>,
}

/// An in-memory [`ResourceStore`] and [`EventStream`].
///
/// Cloning is cheap and clones share state.
#[derive(Clone)]
pub struct InMemoryCluster {
    inner: Arc<Inner>,
}

impl Default for InMemoryCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryCluster")
            .field("resources", &self.inner.resources.lock().len())
            .field("active_subscriptions", &self.active_subscriptions())
            .finish()
    }
}

impl InMemoryCluster {
    /// Creates an empty cluster.
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            inner: Arc::new(Inner {
                resources: Mutex::new(BTreeMap::new()),
                scripts: Mutex::new(HashMap::new()),
                created: Mutex::new(Vec::new()),
                failing_kinds: Mutex::new(HashSet::new()),
                events,
                failing_reads: AtomicUsize::new(0),
                refuse_subscriptions: AtomicBool::new(false),
                reads: AtomicUsize::new(0),
                subscriptions_opened: AtomicUsize::new(0),
                subscriptions_active: Arc::new(AtomicUsize::new(0)),
            }),
        }
    }

    /// Seeds a resource without emitting an event.
    pub fn insert(&self, resource: Resource) {
        let key = (resource.kind, resource.namespace.clone(), resource.name.clone());
        self.inner.resources.lock().insert(key, resource);
    }

    /// Replaces a resource status and emits a `Modified` event.
    ///
    /// Returns false if the resource does not exist.
    pub fn update_status(&self, namespace: &str, kind: ResourceKind, name: &str, status: ResourceStatus) -> bool {
        let updated = self.update_status_silently(namespace, kind, name, status);
        if updated {
            self.emit(ResourceEvent {
                change: ChangeType::Modified,
                kind,
                namespace: namespace.to_string(),
                name: name.to_string(),
            });
        }
        updated
    }

    /// Replaces a resource status without emitting an event.
    pub fn update_status_silently(
        &self,
        namespace: &str,
        kind: ResourceKind,
        name: &str,
        status: ResourceStatus,
    ) -> bool {
        let key = (kind, namespace.to_string(), name.to_string());
        match self.inner.resources.lock().get_mut(&key) {
            Some(resource) => {
                resource.status = status;
                true
            }
            None => false,
        }
    }

    /// Publishes an event to every matching subscription.
    pub fn emit(&self, event: ResourceEvent) {
        // No receivers is not an error.
        let _ = self.inner.events.send(event);
    }

    /// Registers status changes applied after `name` of `kind` is created.
    ///
    /// Delays are relative to the previous step.
    pub fn script(&self, kind: ResourceKind, name: impl Into<String>, steps: Vec<ScriptStep>) {
        self.inner.scripts.lock().insert((kind, name.into()), steps);
    }

    /// Makes the next `count` reads fail with an API error.
    pub fn fail_next_reads(&self, count: usize) {
        self.inner.failing_reads.store(count, Ordering::SeqCst);
    }

    /// Makes every subsequent subscription attempt fail.
    pub fn refuse_subscriptions(&self, refuse: bool) {
        self.inner.refuse_subscriptions.store(refuse, Ordering::SeqCst);
    }

    /// Makes every subsequent create of `kind` fail.
    pub fn fail_creates(&self, kind: ResourceKind) {
        self.inner.failing_kinds.lock().insert(kind);
    }

    /// Returns every successful create in call order.
    #[must_use]
    pub fn created(&self) -> Vec<(ResourceKind, String)> {
        self.inner.created.lock().clone()
    }

    /// Returns true if `name` of `kind` was ever created.
    #[must_use]
    pub fn was_created(&self, kind: ResourceKind, name: &str) -> bool {
        self.inner
            .created
            .lock()
            .iter()
            .any(|(k, n)| *k == kind && n == name)
    }

    /// Returns the number of read calls served.
    #[must_use]
    pub fn read_count(&self) -> usize {
        self.inner.reads.load(Ordering::SeqCst)
    }

    /// Returns the number of subscriptions opened so far.
    #[must_use]
    pub fn subscriptions_opened(&self) -> usize {
        self.inner.subscriptions_opened.load(Ordering::SeqCst)
    }

    /// Returns the number of subscriptions not yet dropped.
    #[must_use]
    pub fn active_subscriptions(&self) -> usize {
        self.inner.subscriptions_active.load(Ordering::SeqCst)
    }

    fn spawn_script(&self, namespace: String, kind: ResourceKind, name: String, steps: Vec<ScriptStep>) {
        let cluster = self.clone();
        tokio::spawn(async move {
            for (delay, status) in steps {
                tokio::time::sleep(delay).await;
                if !cluster.update_status(&namespace, kind, &name, status) {
                    debug!(%kind, namespace, name, "scripted resource disappeared");
                    return;
                }
            }
        });
    }
}

fn initial_status(manifest: &Manifest) -> ResourceStatus {
    let document = manifest.document();
    match manifest.kind() {
        ResourceKind::Pod => ResourceStatus::Pod {
            phase: PodPhase::Pending,
        },
        ResourceKind::Job => ResourceStatus::Job(JobCounts::new(1, 0, 0)),
        ResourceKind::PersistentVolumeClaim => ResourceStatus::Claim {
            phase: Some("Bound".to_string()),
            capacity: document
                .pointer("/spec/resources/requests/storage")
                .and_then(Value::as_str)
                .map(String::from),
            storage_class: document
                .pointer("/spec/storageClassName")
                .and_then(Value::as_str)
                .map(String::from),
        },
        ResourceKind::ConfigMap => ResourceStatus::ConfigMap {
            data: document
                .get("data")
                .and_then(Value::as_object)
                .map(|data| {
                    data.iter()
                        .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                        .collect()
                })
                .unwrap_or_default(),
        },
    }
}

fn labels_of(manifest: &Manifest) -> BTreeMap<String, String> {
    manifest
        .document()
        .pointer("/metadata/labels")
        .and_then(Value::as_object)
        .map(|labels| {
            labels
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

struct SubscriptionGuard(Arc<AtomicUsize>);

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

struct SubscriptionState {
    receiver: broadcast::Receiver<ResourceEvent>,
    namespace: String,
    kind: ResourceKind,
    _guard: SubscriptionGuard,
}

#[async_trait]
impl ResourceStore for InMemoryCluster {
    async fn create(&self, namespace: &str, manifest: &Manifest) -> Result<Resource, ClusterError> {
        let kind = manifest.kind();
        let name = manifest.name().to_string();

        if self.inner.failing_kinds.lock().contains(&kind) {
            return Err(ClusterError::Api(format!("create of {kind} {namespace}/{name} rejected")));
        }

        let resource = Resource {
            kind,
            namespace: namespace.to_string(),
            name: name.clone(),
            created_at: Some(Utc::now()),
            labels: labels_of(manifest),
            status: initial_status(manifest),
        };

        {
            let mut resources = self.inner.resources.lock();
            let key = (kind, namespace.to_string(), name.clone());
            if resources.contains_key(&key) {
                return Err(ClusterError::already_exists(kind, namespace, name));
            }
            resources.insert(key, resource.clone());
        }
        self.inner.created.lock().push((kind, name.clone()));

        self.emit(ResourceEvent {
            change: ChangeType::Added,
            kind,
            namespace: namespace.to_string(),
            name: name.clone(),
        });

        let script = self.inner.scripts.lock().remove(&(kind, name.clone()));
        if let Some(steps) = script {
            self.spawn_script(namespace.to_string(), kind, name, steps);
        }

        Ok(resource)
    }

    async fn read(&self, namespace: &str, kind: ResourceKind, name: &str) -> Result<Resource, ClusterError> {
        self.inner.reads.fetch_add(1, Ordering::SeqCst);

        let injected = self
            .inner
            .failing_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(ClusterError::Api("injected read failure".to_string()));
        }

        self.inner
            .resources
            .lock()
            .get(&(kind, namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| ClusterError::not_found(kind, namespace, name))
    }

    async fn delete(&self, namespace: &str, kind: ResourceKind, name: &str) -> Result<(), ClusterError> {
        let removed = self
            .inner
            .resources
            .lock()
            .remove(&(kind, namespace.to_string(), name.to_string()));

        if removed.is_none() {
            return Err(ClusterError::not_found(kind, namespace, name));
        }

        self.emit(ResourceEvent {
            change: ChangeType::Deleted,
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
        });
        Ok(())
    }

    async fn list(&self, kind: ResourceKind) -> Result<Vec<Resource>, ClusterError> {
        Ok(self
            .inner
            .resources
            .lock()
            .values()
            .filter(|resource| resource.kind == kind)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl EventStream for InMemoryCluster {
    async fn subscribe(&self, namespace: &str, kind: ResourceKind) -> Result<EventSubscription, ClusterError> {
        if self.inner.refuse_subscriptions.load(Ordering::SeqCst) {
            return Err(ClusterError::Stream(format!(
                "cannot watch {kind} in namespace {namespace}"
            )));
        }

        self.inner.subscriptions_opened.fetch_add(1, Ordering::SeqCst);
        self.inner.subscriptions_active.fetch_add(1, Ordering::SeqCst);

        let state = SubscriptionState {
            receiver: self.inner.events.subscribe(),
            namespace: namespace.to_string(),
            kind,
            _guard: SubscriptionGuard(Arc::clone(&self.inner.subscriptions_active)),
        };

        let stream = futures::stream::unfold(state, |mut state| async move {
            loop {
                match state.receiver.recv().await {
                    Ok(event) if event.namespace == state.namespace && event.kind == state.kind => {
                        return Some((Ok(event), state));
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        let err = ClusterError::Stream(format!("subscriber lagged by {skipped} events"));
                        return Some((Err(err), state));
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });

        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{ConfigMapManifest, JobManifest, PodManifest};
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_create_read_delete() {
        let cluster = InMemoryCluster::new();
        let manifest = PodManifest::new("web", "nginx").build();

        let created = cluster.create("default", &manifest).await.unwrap();
        assert_eq!(created.status, ResourceStatus::Pod { phase: PodPhase::Pending });

        let read = cluster.read("default", ResourceKind::Pod, "web").await.unwrap();
        assert_eq!(read.name, "web");

        cluster.delete("default", ResourceKind::Pod, "web").await.unwrap();
        let err = cluster.read("default", ResourceKind::Pod, "web").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_duplicate_create_conflicts() {
        let cluster = InMemoryCluster::new();
        let manifest = JobManifest::new("build", "bash").build();

        cluster.create("ci", &manifest).await.unwrap();
        let err = cluster.create("ci", &manifest).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(cluster.created().len(), 1);
    }

    #[tokio::test]
    async fn test_config_map_data_is_kept() {
        let cluster = InMemoryCluster::new();
        let mut data = BTreeMap::new();
        data.insert("PROJECT_ID".to_string(), "p1".to_string());
        let manifest = ConfigMapManifest::new("p1-config", data.clone()).build();

        let created = cluster.create("default", &manifest).await.unwrap();
        assert_eq!(created.status, ResourceStatus::ConfigMap { data });
    }

    #[tokio::test]
    async fn test_subscription_filters_namespace_and_kind() {
        let cluster = InMemoryCluster::new();
        let mut events = cluster.subscribe("ci", ResourceKind::Job).await.unwrap();

        cluster.create("other", &JobManifest::new("a", "bash").build()).await.unwrap();
        cluster.create("ci", &PodManifest::new("b", "bash").build()).await.unwrap();
        cluster.create("ci", &JobManifest::new("c", "bash").build()).await.unwrap();

        let event = events.next().await.unwrap().unwrap();
        assert_eq!(event.name, "c");
        assert_eq!(event.change, ChangeType::Added);
    }

    #[tokio::test]
    async fn test_dropping_subscription_is_tracked() {
        let cluster = InMemoryCluster::new();
        let events = cluster.subscribe("ci", ResourceKind::Job).await.unwrap();
        assert_eq!(cluster.active_subscriptions(), 1);

        drop(events);
        assert_eq!(cluster.active_subscriptions(), 0);
        assert_eq!(cluster.subscriptions_opened(), 1);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let cluster = InMemoryCluster::new();
        cluster.fail_next_reads(1);
        assert!(cluster.read("ns", ResourceKind::Pod, "x").await.is_err());
        let second = cluster.read("ns", ResourceKind::Pod, "x").await.unwrap_err();
        assert!(second.is_not_found());

        cluster.refuse_subscriptions(true);
        assert!(cluster.subscribe("ns", ResourceKind::Pod).await.is_err());

        cluster.fail_creates(ResourceKind::ConfigMap);
        let manifest = ConfigMapManifest::new("cfg", BTreeMap::new()).build();
        assert!(cluster.create("ns", &manifest).await.is_err());
        assert!(!cluster.was_created(ResourceKind::ConfigMap, "cfg"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_script_applies_after_create() {
        let cluster = InMemoryCluster::new();
        cluster.script(
            ResourceKind::Job,
            "build",
            vec![(Duration::from_secs(5), ResourceStatus::Job(JobCounts::new(0, 1, 0)))],
        );

        cluster.create("ci", &JobManifest::new("build", "bash").build()).await.unwrap();
        tokio::time::sleep(Duration::from_secs(6)).await;

        let job = cluster.read("ci", ResourceKind::Job, "build").await.unwrap();
        assert_eq!(job.status, ResourceStatus::Job(JobCounts::new(0, 1, 0)));
    }
}
