//! [`ResourceStore`] and [`EventStream`] backed by the `kube` client.

use super::{
    ChangeType, EventStream, EventSubscription, JobCounts, Manifest, PodPhase, Resource,
    ResourceEvent, ResourceStatus, ResourceStore,
};
use crate::core::ResourceKind;
use crate::errors::ClusterError;
use async_trait::async_trait;
use futures::{Stream, StreamExt, TryStreamExt};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolumeClaim, Pod};
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Client, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use tracing::{debug, info};

/// A typed Kubernetes object this backend knows how to summarize.
trait ClusterObject:
    kube::Resource<Scope = NamespaceResourceScope, DynamicType = ()>
    + Clone
    + DeserializeOwned
    + Serialize
    + Debug
    + Send
    + Sync
    + 'static
{
    const KIND: ResourceKind;

    fn status(&self) -> ResourceStatus;
}

fn count(value: Option<i32>) -> u32 {
    value.and_then(|v| u32::try_from(v).ok()).unwrap_or(0)
}

impl ClusterObject for Pod {
    const KIND: ResourceKind = ResourceKind::Pod;

    fn status(&self) -> ResourceStatus {
        let phase = self
            .status
            .as_ref()
            .and_then(|status| status.phase.as_deref())
            .map(PodPhase::from)
            .unwrap_or_default();
        ResourceStatus::Pod { phase }
    }
}

impl ClusterObject for Job {
    const KIND: ResourceKind = ResourceKind::Job;

    fn status(&self) -> ResourceStatus {
        let counts = self
            .status
            .as_ref()
            .map(|status| JobCounts::new(count(status.active), count(status.succeeded), count(status.failed)))
            .unwrap_or_default();
        ResourceStatus::Job(counts)
    }
}

impl ClusterObject for PersistentVolumeClaim {
    const KIND: ResourceKind = ResourceKind::PersistentVolumeClaim;

    fn status(&self) -> ResourceStatus {
        let status = self.status.as_ref();
        ResourceStatus::Claim {
            phase: status.and_then(|status| status.phase.clone()),
            capacity: status
                .and_then(|status| status.capacity.as_ref())
                .and_then(|capacity| capacity.get("storage"))
                .map(|quantity| quantity.0.clone()),
            storage_class: self
                .spec
                .as_ref()
                .and_then(|spec| spec.storage_class_name.clone()),
        }
    }
}

impl ClusterObject for ConfigMap {
    const KIND: ResourceKind = ResourceKind::ConfigMap;

    fn status(&self) -> ResourceStatus {
        ResourceStatus::ConfigMap {
            data: self.data.clone().unwrap_or_default(),
        }
    }
}

fn summarize<K: ClusterObject>(object: &K) -> Resource {
    Resource {
        kind: K::KIND,
        namespace: object.namespace().unwrap_or_default(),
        name: object.name_any(),
        created_at: object.creation_timestamp().map(|time| time.0),
        labels: object.labels().clone(),
        status: object.status(),
    }
}

fn map_error(err: kube::Error, kind: ResourceKind, namespace: &str, name: &str) -> ClusterError {
    match err {
        kube::Error::Api(response) if response.code == 404 => ClusterError::not_found(kind, namespace, name),
        kube::Error::Api(response) if response.code == 409 => ClusterError::already_exists(kind, namespace, name),
        kube::Error::Api(response) => ClusterError::Api(response.message),
        other => ClusterError::Api(other.to_string()),
    }
}

/// A cluster reached through the Kubernetes API server.
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl std::fmt::Debug for KubeCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeCluster").finish_non_exhaustive()
    }
}

impl KubeCluster {
    /// Connects using in-cluster credentials or the local kubeconfig.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError::Api`] if no usable configuration is found.
    pub async fn connect() -> Result<Self, ClusterError> {
        let client = Client::try_default()
            .await
            .map_err(|err| ClusterError::Api(format!("failed to build kube client: {err}")))?;
        info!("connected to Kubernetes API server");
        Ok(Self { client })
    }

    /// Wraps an existing client.
    #[must_use]
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    async fn create_typed<K: ClusterObject>(&self, namespace: &str, manifest: &Manifest) -> Result<Resource, ClusterError> {
        let object: K = serde_json::from_value(manifest.document().clone())?;
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let created = api
            .create(&PostParams::default(), &object)
            .await
            .map_err(|err| map_error(err, K::KIND, namespace, manifest.name()))?;
        Ok(summarize(&created))
    }

    async fn read_typed<K: ClusterObject>(&self, namespace: &str, name: &str) -> Result<Resource, ClusterError> {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let object = api
            .get(name)
            .await
            .map_err(|err| map_error(err, K::KIND, namespace, name))?;
        Ok(summarize(&object))
    }

    async fn delete_typed<K: ClusterObject>(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        api.delete(name, &DeleteParams::background())
            .await
            .map_err(|err| map_error(err, K::KIND, namespace, name))?;
        Ok(())
    }

    async fn list_typed<K: ClusterObject>(&self) -> Result<Vec<Resource>, ClusterError> {
        let api: Api<K> = Api::all(self.client.clone());
        let objects = api
            .list(&ListParams::default())
            .await
            .map_err(|err| map_error(err, K::KIND, "", ""))?;
        Ok(objects.items.iter().map(summarize).collect())
    }

    fn subscribe_typed<K: ClusterObject>(&self, namespace: &str) -> EventSubscription {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        into_subscription(watcher(api, watcher::Config::default()), namespace.to_string())
    }
}

/// Turns raw watcher events into a subscription.
///
/// Watch errors are surfaced, and the watcher backs off before relisting.
fn into_subscription<K, S>(events: S, namespace: String) -> EventSubscription
where
    K: ClusterObject,
    S: Stream<Item = watcher::Result<watcher::Event<K>>> + Send + 'static,
{
    events
        .default_backoff()
        .map_err(|err| ClusterError::Stream(err.to_string()))
        .try_filter_map(move |event| {
            let namespace = namespace.clone();
            async move {
                let (change, object) = match event {
                    watcher::Event::Apply(object) => (ChangeType::Modified, object),
                    watcher::Event::InitApply(object) => (ChangeType::Added, object),
                    watcher::Event::Delete(object) => (ChangeType::Deleted, object),
                    watcher::Event::Init | watcher::Event::InitDone => return Ok(None),
                };
                Ok(Some(ResourceEvent {
                    change,
                    kind: K::KIND,
                    namespace,
                    name: object.name_any(),
                }))
            }
        })
        .boxed()
}

#[async_trait]
impl ResourceStore for KubeCluster {
    async fn create(&self, namespace: &str, manifest: &Manifest) -> Result<Resource, ClusterError> {
        debug!(kind = %manifest.kind(), namespace, name = manifest.name(), "creating resource");
        match manifest.kind() {
            ResourceKind::Pod => self.create_typed::<Pod>(namespace, manifest).await,
            ResourceKind::Job => self.create_typed::<Job>(namespace, manifest).await,
            ResourceKind::PersistentVolumeClaim => {
                self.create_typed::<PersistentVolumeClaim>(namespace, manifest).await
            }
            ResourceKind::ConfigMap => self.create_typed::<ConfigMap>(namespace, manifest).await,
        }
    }

    async fn read(&self, namespace: &str, kind: ResourceKind, name: &str) -> Result<Resource, ClusterError> {
        match kind {
            ResourceKind::Pod => self.read_typed::<Pod>(namespace, name).await,
            ResourceKind::Job => self.read_typed::<Job>(namespace, name).await,
            ResourceKind::PersistentVolumeClaim => self.read_typed::<PersistentVolumeClaim>(namespace, name).await,
            ResourceKind::ConfigMap => self.read_typed::<ConfigMap>(namespace, name).await,
        }
    }

    async fn delete(&self, namespace: &str, kind: ResourceKind, name: &str) -> Result<(), ClusterError> {
        debug!(%kind, namespace, name, "deleting resource");
        match kind {
            ResourceKind::Pod => self.delete_typed::<Pod>(namespace, name).await,
            ResourceKind::Job => self.delete_typed::<Job>(namespace, name).await,
            ResourceKind::PersistentVolumeClaim => self.delete_typed::<PersistentVolumeClaim>(namespace, name).await,
            ResourceKind::ConfigMap => self.delete_typed::<ConfigMap>(namespace, name).await,
        }
    }

    async fn list(&self, kind: ResourceKind) -> Result<Vec<Resource>, ClusterError> {
        match kind {
            ResourceKind::Pod => self.list_typed::<Pod>().await,
            ResourceKind::Job => self.list_typed::<Job>().await,
            ResourceKind::PersistentVolumeClaim => self.list_typed::<PersistentVolumeClaim>().await,
            ResourceKind::ConfigMap => self.list_typed::<ConfigMap>().await,
        }
    }
}

#[async_trait]
impl EventStream for KubeCluster {
    async fn subscribe(&self, namespace: &str, kind: ResourceKind) -> Result<EventSubscription, ClusterError> {
        Ok(match kind {
            ResourceKind::Pod => self.subscribe_typed::<Pod>(namespace),
            ResourceKind::Job => self.subscribe_typed::<Job>(namespace),
            ResourceKind::PersistentVolumeClaim => self.subscribe_typed::<PersistentVolumeClaim>(namespace),
            ResourceKind::ConfigMap => self.subscribe_typed::<ConfigMap>(namespace),
        })
    }
}
