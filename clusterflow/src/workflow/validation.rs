//! The project validation workflow.

use super::{ProvisionedResources, ResourceProvisioner, WorkflowOrchestrator, WorkflowResult, WorkflowStep};
use crate::errors::WorkflowError;
use crate::templates::{BUILDER_JOB, PLUGIN_CHECK_JOB, VOLUME_COPY_JOB};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

const DNS_LABEL_PATTERN: &str = "^[a-z0-9]([-a-z0-9]*[a-z0-9])?$";
// Leaves room for the longest derived suffix ("-volume-copy").
const MAX_PROJECT_ID_LEN: usize = 63 - "-volume-copy".len();

/// Input to [`ValidationWorkflow::run_validation_workflow`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRequest {
    /// Project id. Resource names are derived from it.
    #[serde(default)]
    pub project_id: String,
    /// Human-readable project name.
    #[serde(default)]
    pub project_name: String,
    /// Location of the project sources.
    #[serde(default, alias = "gcpPath")]
    pub source_path: String,
    /// Image of the builder step.
    #[serde(default)]
    pub builder_image: Option<String>,
    /// Target namespace.
    #[serde(default)]
    pub namespace: Option<String>,
}

impl ValidationRequest {
    /// Creates a request with the required fields.
    #[must_use]
    pub fn new(project_id: impl Into<String>, project_name: impl Into<String>, source_path: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            project_name: project_name.into(),
            source_path: source_path.into(),
            builder_image: None,
            namespace: None,
        }
    }

    /// Overrides the builder image.
    #[must_use]
    pub fn with_builder_image(mut self, image: impl Into<String>) -> Self {
        self.builder_image = Some(image.into());
        self
    }

    /// Overrides the namespace.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    fn validate(&self) -> Result<(), WorkflowError> {
        let required = [
            ("projectId", &self.project_id),
            ("projectName", &self.project_name),
            ("sourcePath", &self.source_path),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(WorkflowError::MissingField(field));
            }
        }

        let invalid = |reason: String| WorkflowError::InvalidField {
            field: "projectId",
            reason,
        };
        let label = Regex::new(DNS_LABEL_PATTERN).map_err(|err| invalid(err.to_string()))?;
        if !label.is_match(&self.project_id) {
            return Err(invalid(format!(
                "'{}' must consist of lower case alphanumeric characters or '-', and start and end with an alphanumeric character",
                self.project_id
            )));
        }
        if self.project_id.len() > MAX_PROJECT_ID_LEN {
            return Err(invalid(format!("must be at most {MAX_PROJECT_ID_LEN} characters")));
        }
        Ok(())
    }
}

/// The result of a validation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRun {
    /// Project id.
    pub project_id: String,
    /// Namespace the run used.
    pub namespace: String,
    /// Shared resources, when provisioning succeeded.
    pub resources: Option<ProvisionedResources>,
    /// Step results.
    pub workflow: WorkflowResult,
}

impl ValidationRun {
    /// True if provisioning and every step succeeded.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.resources.is_some() && self.workflow.overall_success
    }

    /// A one-line summary of the run.
    #[must_use]
    pub fn summary(&self) -> &'static str {
        if self.succeeded() {
            "Validation workflow completed successfully"
        } else {
            "Validation workflow failed"
        }
    }
}

/// Provisions a project and runs plugin check, build and volume copy.
#[derive(Debug, Clone)]
pub struct ValidationWorkflow {
    provisioner: ResourceProvisioner,
    orchestrator: WorkflowOrchestrator,
    default_namespace: String,
    default_builder_image: String,
}

impl ValidationWorkflow {
    /// Creates the workflow with its defaults.
    #[must_use]
    pub fn new(
        provisioner: ResourceProvisioner,
        orchestrator: WorkflowOrchestrator,
        default_namespace: impl Into<String>,
        default_builder_image: impl Into<String>,
    ) -> Self {
        Self {
            provisioner,
            orchestrator,
            default_namespace: default_namespace.into(),
            default_builder_image: default_builder_image.into(),
        }
    }

    /// The fixed step list for `project_id`.
    #[must_use]
    pub fn steps(project_id: &str, resources: &ProvisionedResources, builder_image: &str) -> Vec<WorkflowStep> {
        vec![
            WorkflowStep::new("Plugin Version Check", PLUGIN_CHECK_JOB)
                .with_binding("JOB_NAME", format!("{project_id}-plugin-check"))
                .with_binding("CONFIG_MAP", &resources.config_map_name),
            WorkflowStep::new("Builder", BUILDER_JOB)
                .with_binding("JOB_NAME", format!("{project_id}-builder"))
                .with_binding("CONFIG_MAP", &resources.config_map_name)
                .with_binding("PVC_NAME", &resources.pvc_name)
                .with_binding("BUILDER_IMAGE", builder_image),
            WorkflowStep::new("Volume Copy", VOLUME_COPY_JOB)
                .with_binding("JOB_NAME", format!("{project_id}-volume-copy"))
                .with_binding("CONFIG_MAP", &resources.config_map_name)
                .with_binding("PVC_NAME", &resources.pvc_name),
        ]
    }

    /// Validates `request`, provisions the project and runs its steps.
    ///
    /// A provisioning failure is reported in the returned run: no step
    /// starts and the workflow error names the failure.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::MissingField`] or
    /// [`WorkflowError::InvalidField`] for unusable input. Nothing is
    /// created in that case.
    pub async fn run_validation_workflow(&self, request: &ValidationRequest) -> Result<ValidationRun, WorkflowError> {
        request.validate()?;

        let project_id = request.project_id.as_str();
        let namespace = request
            .namespace
            .clone()
            .filter(|ns| !ns.is_empty())
            .unwrap_or_else(|| self.default_namespace.clone());
        let builder_image = request
            .builder_image
            .clone()
            .filter(|image| !image.is_empty())
            .unwrap_or_else(|| self.default_builder_image.clone());

        info!(project_id, project_name = %request.project_name, namespace = %namespace, "starting validation workflow");

        let project_config = BTreeMap::from([
            ("PROJECT_ID".to_string(), project_id.to_string()),
            ("PROJECT_NAME".to_string(), request.project_name.clone()),
            ("SOURCE_PATH".to_string(), request.source_path.clone()),
            ("BUILDER_IMAGE".to_string(), builder_image.clone()),
        ]);

        let resources = match self
            .provisioner
            .create_project_resources(project_id, &namespace, project_config)
            .await
        {
            Ok(resources) => resources,
            Err(err) => {
                warn!(project_id, error = %err, "validation workflow not started");
                let planned = ProvisionedResources::for_project(project_id);
                let workflow = self
                    .orchestrator
                    .abandon_workflow(&Self::steps(project_id, &planned, &builder_image), err.to_string())
                    .await;
                return Ok(ValidationRun {
                    project_id: project_id.to_string(),
                    namespace,
                    resources: None,
                    workflow,
                });
            }
        };

        let steps = Self::steps(project_id, &resources, &builder_image);
        let workflow = self.orchestrator.run_workflow(project_id, &namespace, &steps).await;

        Ok(ValidationRun {
            project_id: project_id.to_string(),
            namespace,
            resources: Some(resources),
            workflow,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_required_fields() {
        let err = ValidationRequest::new("", "Name", "gs://bucket").validate().unwrap_err();
        assert_eq!(err.to_string(), "Missing required field: projectId");

        let err = ValidationRequest::new("p1", " ", "gs://bucket").validate().unwrap_err();
        assert_eq!(err.to_string(), "Missing required field: projectName");

        let err = ValidationRequest::new("p1", "Name", "").validate().unwrap_err();
        assert_eq!(err.to_string(), "Missing required field: sourcePath");
    }

    #[test]
    fn test_validate_project_id_is_dns_label() {
        assert!(ValidationRequest::new("proj-1", "Name", "src").validate().is_ok());
        for bad in ["Proj", "-proj", "proj-", "proj_1", "proj.1"] {
            let err = ValidationRequest::new(bad, "Name", "src").validate().unwrap_err();
            assert!(matches!(err, WorkflowError::InvalidField { field: "projectId", .. }), "{bad}");
        }
        let long = "a".repeat(MAX_PROJECT_ID_LEN + 1);
        assert!(ValidationRequest::new(long, "Name", "src").validate().is_err());
    }

    #[test]
    fn test_request_accepts_legacy_path_field() {
        let request: ValidationRequest =
            serde_json::from_str(r#"{"projectId":"p1","projectName":"P","gcpPath":"gs://b/p1"}"#).unwrap();
        assert_eq!(request.source_path, "gs://b/p1");
        assert!(request.builder_image.is_none());
    }

    #[test]
    fn test_step_bindings() {
        let resources = ProvisionedResources::for_project("p1");
        let steps = ValidationWorkflow::steps("p1", &resources, "bash:5");

        let names: Vec<_> = steps.iter().map(|step| step.name.as_str()).collect();
        assert_eq!(names, vec!["Plugin Version Check", "Builder", "Volume Copy"]);
        assert_eq!(steps[0].bindings["JOB_NAME"], "p1-plugin-check");
        assert!(!steps[0].bindings.contains_key("PVC_NAME"));
        assert_eq!(steps[1].bindings["BUILDER_IMAGE"], "bash:5");
        assert_eq!(steps[1].bindings["PVC_NAME"], "p1-data");
        assert_eq!(steps[2].bindings["JOB_NAME"], "p1-volume-copy");
        assert_eq!(steps[2].bindings["CONFIG_MAP"], "p1-config");
    }
}
