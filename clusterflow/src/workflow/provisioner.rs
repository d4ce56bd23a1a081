//! Creates the resources a project's workflow steps share.

use crate::cluster::{ClaimManifest, ConfigMapManifest, ResourceStore};
use crate::errors::WorkflowError;
use crate::events::{EventSink, WorkflowEvent};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info};

/// Storage settings for project claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningConfig {
    /// Storage class requested by the claim.
    #[serde(default = "default_storage_class")]
    pub storage_class: String,
    /// Requested claim size.
    #[serde(default = "default_claim_size")]
    pub claim_size: String,
}

fn default_storage_class() -> String {
    "standard".to_string()
}

fn default_claim_size() -> String {
    "5Gi".to_string()
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            storage_class: default_storage_class(),
            claim_size: default_claim_size(),
        }
    }
}

/// Names of the shared project resources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionedResources {
    /// Claim mounted by the build steps.
    pub pvc_name: String,
    /// Config map exposed to every step.
    pub config_map_name: String,
}

impl ProvisionedResources {
    /// Derives the resource names for `project_id`.
    #[must_use]
    pub fn for_project(project_id: &str) -> Self {
        Self {
            pvc_name: format!("{project_id}-data"),
            config_map_name: format!("{project_id}-config"),
        }
    }
}

/// Creates the claim and config map of a project.
#[derive(Clone)]
pub struct ResourceProvisioner {
    store: Arc<dyn ResourceStore>,
    events: Arc<dyn EventSink>,
    config: ProvisioningConfig,
}

impl std::fmt::Debug for ResourceProvisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceProvisioner")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ResourceProvisioner {
    /// Creates a provisioner.
    #[must_use]
    pub fn new(store: Arc<dyn ResourceStore>, events: Arc<dyn EventSink>, config: ProvisioningConfig) -> Self {
        Self { store, events, config }
    }

    /// Creates `{project_id}-data` and then `{project_id}-config` holding
    /// `project_config`.
    ///
    /// Nothing is rolled back: if the config map fails, the claim stays and
    /// is named in the error.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Provisioning`] if either create fails.
    pub async fn create_project_resources(
        &self,
        project_id: &str,
        namespace: &str,
        project_config: BTreeMap<String, String>,
    ) -> Result<ProvisionedResources, WorkflowError> {
        let resources = ProvisionedResources::for_project(project_id);
        let mut created = Vec::new();

        let claim = ClaimManifest::new(
            &resources.pvc_name,
            &self.config.claim_size,
            &self.config.storage_class,
        )
        .build();
        let config_map = ConfigMapManifest::new(&resources.config_map_name, project_config).build();

        for manifest in [claim, config_map] {
            if let Err(err) = self.store.create(namespace, &manifest).await {
                error!(project_id, namespace, name = manifest.name(), error = %err, "provisioning failed");
                let failure = WorkflowError::Provisioning {
                    project_id: project_id.to_string(),
                    reason: err.to_string(),
                    created,
                };
                self.events
                    .emit(WorkflowEvent::ResourcesFailed {
                        project_id: project_id.to_string(),
                        error: failure.to_string(),
                    })
                    .await;
                return Err(failure);
            }
            info!(project_id, namespace, kind = %manifest.kind(), name = manifest.name(), "resource provisioned");
            created.push(manifest.name().to_string());
        }

        self.events
            .emit(WorkflowEvent::ResourcesProvisioned {
                project_id: project_id.to_string(),
                claim: resources.pvc_name.clone(),
                config_map: resources.config_map_name.clone(),
            })
            .await;
        Ok(resources)
    }
}
