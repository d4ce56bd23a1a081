//! Typed manifest builders.
//!
//! A [`Manifest`] is the document submitted to [`ResourceStore::create`].
//! Builders below produce Kubernetes-shaped JSON so the same document can be
//! handed to the API server unchanged or stored by the in-memory cluster.
//!
//! [`ResourceStore::create`]: super::ResourceStore::create

use crate::core::ResourceKind;
use crate::errors::ClusterError;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// A resource document ready for creation.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    kind: ResourceKind,
    name: String,
    document: Value,
}

impl Manifest {
    /// Wraps a raw document, extracting its kind and name.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError::InvalidManifest`] if `kind` is missing or
    /// unsupported, or if `metadata.name` is missing or empty.
    pub fn from_document(document: Value) -> Result<Self, ClusterError> {
        let kind_field = document
            .get("kind")
            .and_then(Value::as_str)
            .ok_or_else(|| ClusterError::InvalidManifest("missing 'kind'".to_string()))?;
        let kind = ResourceKind::from_manifest_kind(kind_field).ok_or_else(|| {
            ClusterError::InvalidManifest(format!("unsupported kind '{kind_field}'"))
        })?;
        let name = document
            .pointer("/metadata/name")
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| ClusterError::InvalidManifest("missing 'metadata.name'".to_string()))?
            .to_string();

        Ok(Self {
            kind,
            name,
            document,
        })
    }

    /// The resource kind.
    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// The resource name from `metadata.name`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The full document.
    #[must_use]
    pub fn document(&self) -> &Value {
        &self.document
    }

    /// Consumes the manifest and returns the document.
    #[must_use]
    pub fn into_document(self) -> Value {
        self.document
    }

    fn build(kind: ResourceKind, name: String, metadata_extra: Map<String, Value>, body: Map<String, Value>) -> Self {
        let mut metadata = Map::new();
        metadata.insert("name".to_string(), Value::String(name.clone()));
        metadata.extend(metadata_extra);

        let mut document = Map::new();
        document.insert("apiVersion".to_string(), json!(kind.api_version()));
        document.insert("kind".to_string(), json!(kind.to_string()));
        document.insert("metadata".to_string(), Value::Object(metadata));
        document.extend(body);

        Self {
            kind,
            name,
            document: Value::Object(document),
        }
    }
}

/// Builder for a single-container pod.
#[derive(Debug, Clone)]
pub struct PodManifest {
    name: String,
    image: String,
    container_port: Option<u16>,
}

impl PodManifest {
    /// Creates a pod with one container named after the pod.
    #[must_use]
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            container_port: None,
        }
    }

    /// Exposes a container port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.container_port = Some(port);
        self
    }

    /// Builds the manifest.
    #[must_use]
    pub fn build(self) -> Manifest {
        let mut container = json!({
            "name": self.name,
            "image": self.image,
        });
        if let Some(port) = self.container_port {
            container["ports"] = json!([{ "containerPort": port }]);
        }

        let mut body = Map::new();
        body.insert(
            "spec".to_string(),
            json!({
                "containers": [container],
                "restartPolicy": "Never",
            }),
        );
        Manifest::build(ResourceKind::Pod, self.name, Map::new(), body)
    }
}

/// Builder for a batch job running one container to completion.
#[derive(Debug, Clone)]
pub struct JobManifest {
    name: String,
    image: String,
    command: Option<Vec<String>>,
    backoff_limit: u32,
    config_map: Option<String>,
    volume: Option<(String, String)>,
    annotations: BTreeMap<String, String>,
}

impl JobManifest {
    /// Creates a job with `backoffLimit: 3` and `restartPolicy: Never`.
    #[must_use]
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            command: None,
            backoff_limit: 3,
            config_map: None,
            volume: None,
            annotations: BTreeMap::new(),
        }
    }

    /// Overrides the container command.
    #[must_use]
    pub fn with_command(mut self, command: Vec<String>) -> Self {
        self.command = Some(command);
        self
    }

    /// Sets the retry budget of the job controller.
    #[must_use]
    pub fn with_backoff_limit(mut self, limit: u32) -> Self {
        self.backoff_limit = limit;
        self
    }

    /// Exposes every key of a config map as an environment variable.
    #[must_use]
    pub fn with_env_from_config_map(mut self, config_map: impl Into<String>) -> Self {
        self.config_map = Some(config_map.into());
        self
    }

    /// Mounts a persistent volume claim at `mount_path`.
    #[must_use]
    pub fn with_volume_claim(mut self, claim: impl Into<String>, mount_path: impl Into<String>) -> Self {
        self.volume = Some((claim.into(), mount_path.into()));
        self
    }

    /// Adds a metadata annotation.
    #[must_use]
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    /// Builds the manifest.
    #[must_use]
    pub fn build(self) -> Manifest {
        let mut container = json!({
            "name": self.name,
            "image": self.image,
        });
        if let Some(command) = &self.command {
            container["command"] = json!(command);
        }
        if let Some(config_map) = &self.config_map {
            container["envFrom"] = json!([{ "configMapRef": { "name": config_map } }]);
        }

        let mut pod_spec = json!({
            "containers": [],
            "restartPolicy": "Never",
        });
        if let Some((claim, mount_path)) = &self.volume {
            container["volumeMounts"] = json!([{ "name": "workspace", "mountPath": mount_path }]);
            pod_spec["volumes"] = json!([{
                "name": "workspace",
                "persistentVolumeClaim": { "claimName": claim },
            }]);
        }
        pod_spec["containers"] = json!([container]);

        let mut metadata = Map::new();
        if !self.annotations.is_empty() {
            metadata.insert("annotations".to_string(), json!(self.annotations));
        }

        let mut body = Map::new();
        body.insert(
            "spec".to_string(),
            json!({
                "backoffLimit": self.backoff_limit,
                "template": { "spec": pod_spec },
            }),
        );
        Manifest::build(ResourceKind::Job, self.name, metadata, body)
    }
}

/// Builder for a persistent volume claim.
#[derive(Debug, Clone)]
pub struct ClaimManifest {
    name: String,
    size: String,
    storage_class: String,
}

impl ClaimManifest {
    /// Creates a `ReadWriteOnce` claim.
    #[must_use]
    pub fn new(name: impl Into<String>, size: impl Into<String>, storage_class: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: size.into(),
            storage_class: storage_class.into(),
        }
    }

    /// Builds the manifest.
    #[must_use]
    pub fn build(self) -> Manifest {
        let mut body = Map::new();
        body.insert(
            "spec".to_string(),
            json!({
                "accessModes": ["ReadWriteOnce"],
                "storageClassName": self.storage_class,
                "resources": { "requests": { "storage": self.size } },
            }),
        );
        Manifest::build(ResourceKind::PersistentVolumeClaim, self.name, Map::new(), body)
    }
}

/// Builder for a config map.
#[derive(Debug, Clone)]
pub struct ConfigMapManifest {
    name: String,
    data: BTreeMap<String, String>,
}

impl ConfigMapManifest {
    /// Creates a config map holding `data`.
    #[must_use]
    pub fn new(name: impl Into<String>, data: BTreeMap<String, String>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    /// Builds the manifest.
    #[must_use]
    pub fn build(self) -> Manifest {
        let mut body = Map::new();
        body.insert("data".to_string(), json!(self.data));
        Manifest::build(ResourceKind::ConfigMap, self.name, Map::new(), body)
    }
}
