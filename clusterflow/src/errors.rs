//! Error types for the clusterflow service.
//!
//! Each layer owns a narrow error enum. The watcher and the workflow loop
//! never surface these to their callers directly: they are converted into
//! result values at the step and provisioner boundaries.

use crate::core::{ResourceKind, StepStatus};
use thiserror::Error;

/// The main error type for clusterflow operations.
#[derive(Debug, Error)]
pub enum ClusterflowError {
    /// A cluster API call failed.
    #[error("{0}")]
    Cluster(#[from] ClusterError),

    /// A manifest could not be rendered.
    #[error("{0}")]
    Template(#[from] TemplateError),

    /// A workflow request was rejected or could not start.
    #[error("{0}")]
    Workflow(#[from] WorkflowError),

    /// Configuration could not be loaded.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors returned by a [`ResourceStore`](crate::cluster::ResourceStore) or
/// an [`EventStream`](crate::cluster::EventStream).
#[derive(Debug, Clone, Error)]
pub enum ClusterError {
    /// The addressed resource does not exist.
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        /// Resource kind.
        kind: ResourceKind,
        /// Namespace.
        namespace: String,
        /// Resource name.
        name: String,
    },

    /// A resource with the same name already exists.
    #[error("{kind} {namespace}/{name} already exists")]
    AlreadyExists {
        /// Resource kind.
        kind: ResourceKind,
        /// Namespace.
        namespace: String,
        /// Resource name.
        name: String,
    },

    /// The manifest submitted for creation is malformed.
    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    /// The event stream could not be opened or broke mid-flight.
    #[error("Event stream error: {0}")]
    Stream(String),

    /// Any other API server or transport error.
    #[error("Cluster API error: {0}")]
    Api(String),
}

impl ClusterError {
    /// Creates a not found error.
    #[must_use]
    pub fn not_found(kind: ResourceKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Creates an already exists error.
    #[must_use]
    pub fn already_exists(
        kind: ResourceKind,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::AlreadyExists {
            kind,
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Returns true if the error means the resource does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true if the error is a naming conflict.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }
}

impl From<serde_json::Error> for ClusterError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidManifest(err.to_string())
    }
}

/// Errors raised while turning a template and its bindings into a manifest.
#[derive(Debug, Clone, Error)]
pub enum TemplateError {
    /// No template is registered under the requested id.
    #[error("Template not found: {0}")]
    NotFound(String),

    /// One or more required bindings were not supplied.
    #[error("Template '{template}' is missing bindings: {}", missing.join(", "))]
    MissingBindings {
        /// The template id.
        template: String,
        /// Names of the placeholders left unresolved.
        missing: Vec<String>,
    },

    /// The rendered document could not be parsed.
    #[error("Failed to parse template '{template}': {reason}")]
    Parse {
        /// The template id.
        template: String,
        /// Parser message.
        reason: String,
    },

    /// The template file could not be read.
    #[error("Failed to load template '{template}': {reason}")]
    Load {
        /// The template id.
        template: String,
        /// IO message.
        reason: String,
    },
}

impl TemplateError {
    /// Creates a missing bindings error.
    #[must_use]
    pub fn missing(template: impl Into<String>, missing: Vec<String>) -> Self {
        Self::MissingBindings {
            template: template.into(),
            missing,
        }
    }

    /// Creates a parse error.
    #[must_use]
    pub fn parse(template: impl Into<String>, reason: impl ToString) -> Self {
        Self::Parse {
            template: template.into(),
            reason: reason.to_string(),
        }
    }
}

/// Errors raised before a workflow is allowed to start.
#[derive(Debug, Clone, Error)]
pub enum WorkflowError {
    /// A required request field was empty.
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// A field value cannot be used to derive resource names.
    #[error("Invalid {field}: {reason}")]
    InvalidField {
        /// The field name.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// A step status change would move backwards or skip a state.
    #[error("Step '{step}' cannot move from {from} to {to}")]
    InvalidTransition {
        /// The step name.
        step: String,
        /// Current status.
        from: StepStatus,
        /// Requested status.
        to: StepStatus,
    },

    /// The shared project resources could not be created.
    #[error("Failed to provision resources for project '{project_id}': {reason}{}", orphan_note(.created))]
    Provisioning {
        /// The project id.
        project_id: String,
        /// The underlying cluster error.
        reason: String,
        /// Resources created before the failure. They are not rolled back.
        created: Vec<String>,
    },
}

fn orphan_note(created: &[String]) -> String {
    if created.is_empty() {
        String::new()
    } else {
        format!(" (left in place: {})", created.join(", "))
    }
}

/// Errors raised while loading the service configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read config file {path}: {source}")]
    Read {
        /// File path.
        path: String,
        /// IO error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid YAML for [`ServiceConfig`](crate::config::ServiceConfig).
    #[error("Failed to parse config file {path}: {reason}")]
    Parse {
        /// File path.
        path: String,
        /// Parser message.
        reason: String,
    },

    /// An environment override carried an unusable value.
    #[error("Invalid value for {var}: {reason}")]
    Env {
        /// Variable name.
        var: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = ClusterError::not_found(ResourceKind::Job, "default", "build");
        assert_eq!(err.to_string(), "Job default/build not found");
        assert!(err.is_not_found());
        assert!(!err.is_conflict());
    }

    #[test]
    fn test_conflict_display() {
        let err = ClusterError::already_exists(ResourceKind::Pod, "ns", "web");
        assert!(err.is_conflict());
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn test_missing_bindings_lists_every_name() {
        let err = TemplateError::missing(
            "builder-job",
            vec!["PVC_NAME".to_string(), "CONFIG_MAP".to_string()],
        );
        assert_eq!(
            err.to_string(),
            "Template 'builder-job' is missing bindings: PVC_NAME, CONFIG_MAP"
        );
    }

    #[test]
    fn test_provisioning_error_names_leftovers() {
        let err = WorkflowError::Provisioning {
            project_id: "p1".to_string(),
            reason: "quota exceeded".to_string(),
            created: vec!["p1-data".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Failed to provision resources for project 'p1': quota exceeded (left in place: p1-data)"
        );
    }

    #[test]
    fn test_wraps_into_top_level_error() {
        let err: ClusterflowError = WorkflowError::MissingField("projectId").into();
        assert_eq!(err.to_string(), "Missing required field: projectId");
    }
}
