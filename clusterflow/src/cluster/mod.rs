//! Cluster collaborator interfaces.
//!
//! The watcher and the workflow engine only depend on the two traits in
//! this module:
//!
//! - [`ResourceStore`]: create/read/delete/list calls against the API server
//! - [`EventStream`]: push notifications for resources of one kind in one
//!   namespace
//!
//! Two backends are provided. [`InMemoryCluster`] keeps everything in
//! process and is scriptable from tests. `KubeCluster` (feature `kube`)
//! talks to a real API server through the [`kube`](https://docs.rs/kube)
//! client using the ambient configuration (in-cluster or `~/.kube/config`).

#[cfg(feature = "kube")]
mod kubernetes;
mod manifest;
mod memory;

#[cfg(feature = "kube")]
pub use kubernetes::KubeCluster;
pub use manifest::{ClaimManifest, ConfigMapManifest, JobManifest, Manifest, PodManifest};
pub use memory::InMemoryCluster;

use crate::core::ResourceKind;
use crate::errors::ClusterError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A simplified view of a pod phase.
///
/// Mirrors the string phases reported by Kubernetes. Unknown values map to
/// [`PodPhase::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PodPhase {
    /// Accepted but not all containers are running yet.
    #[default]
    Pending,
    /// Bound to a node with at least one container running.
    Running,
    /// All containers terminated successfully.
    Succeeded,
    /// All containers terminated, at least one in failure.
    Failed,
    /// The phase could not be determined.
    Unknown,
}

impl From<&str> for PodPhase {
    fn from(value: &str) -> Self {
        match value {
            "Pending" => Self::Pending,
            "Running" => Self::Running,
            "Succeeded" => Self::Succeeded,
            "Failed" => Self::Failed,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for PodPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Running => write!(f, "Running"),
            Self::Succeeded => write!(f, "Succeeded"),
            Self::Failed => write!(f, "Failed"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Pod counters reported by the job controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JobCounts {
    /// Pods currently running.
    pub active: u32,
    /// Pods that finished successfully.
    pub succeeded: u32,
    /// Pods that failed.
    pub failed: u32,
}

impl JobCounts {
    /// Creates a counter set.
    #[must_use]
    pub fn new(active: u32, succeeded: u32, failed: u32) -> Self {
        Self {
            active,
            succeeded,
            failed,
        }
    }
}

/// Kind-specific status of a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ResourceStatus {
    /// Pod status.
    Pod {
        /// Current phase.
        phase: PodPhase,
    },
    /// Job status.
    Job(JobCounts),
    /// Persistent volume claim status.
    Claim {
        /// Binding phase (`Pending`, `Bound`, `Lost`).
        phase: Option<String>,
        /// Provisioned capacity.
        capacity: Option<String>,
        /// Storage class the claim requested.
        storage_class: Option<String>,
    },
    /// Config map contents.
    ConfigMap {
        /// Key/value data.
        data: BTreeMap<String, String>,
    },
}

/// A resource as returned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// The resource kind.
    pub kind: ResourceKind,
    /// Namespace.
    pub namespace: String,
    /// Name.
    pub name: String,
    /// Creation time reported by the server.
    pub created_at: Option<DateTime<Utc>>,
    /// Metadata labels.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Kind-specific status.
    pub status: ResourceStatus,
}

/// The type of change carried by a [`ResourceEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeType {
    /// The object was created (or seen for the first time).
    Added,
    /// The object changed.
    Modified,
    /// The object was removed.
    Deleted,
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Added => write!(f, "ADDED"),
            Self::Modified => write!(f, "MODIFIED"),
            Self::Deleted => write!(f, "DELETED"),
        }
    }
}

/// A change notification.
///
/// Events only say *that* something changed. Consumers re-read the resource
/// for its authoritative state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceEvent {
    /// What happened.
    pub change: ChangeType,
    /// Kind of the changed object.
    pub kind: ResourceKind,
    /// Namespace of the changed object.
    pub namespace: String,
    /// Name of the changed object.
    pub name: String,
}

/// A live subscription. Dropping it stops delivery.
pub type EventSubscription = BoxStream<'static, Result<ResourceEvent, ClusterError>>;

/// Request/response access to cluster resources.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Creates a resource from a manifest.
    async fn create(&self, namespace: &str, manifest: &Manifest) -> Result<Resource, ClusterError>;

    /// Reads one resource. Missing resources yield [`ClusterError::NotFound`].
    async fn read(&self, namespace: &str, kind: ResourceKind, name: &str) -> Result<Resource, ClusterError>;

    /// Deletes one resource.
    async fn delete(&self, namespace: &str, kind: ResourceKind, name: &str) -> Result<(), ClusterError>;

    /// Lists resources of a kind across all namespaces.
    async fn list(&self, kind: ResourceKind) -> Result<Vec<Resource>, ClusterError>;
}

/// Change notifications for resources.
///
/// Delivery is at-least-once with best-effort ordering; events may be
/// coalesced or replayed.
#[async_trait]
pub trait EventStream: Send + Sync {
    /// Opens a subscription scoped to one namespace and kind.
    async fn subscribe(&self, namespace: &str, kind: ResourceKind) -> Result<EventSubscription, ClusterError>;
}
