//! Workflow lifecycle events.

use serde::Serialize;
use uuid::Uuid;

/// A lifecycle event emitted by the provisioner and the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum WorkflowEvent {
    /// A run began.
    #[serde(rename = "workflow.started")]
    WorkflowStarted {
        /// Run id.
        run_id: Uuid,
        /// Project the run belongs to.
        project_id: String,
        /// Target namespace.
        namespace: String,
        /// Number of steps.
        steps: usize,
    },
    /// Project resources were created.
    #[serde(rename = "resources.provisioned")]
    ResourcesProvisioned {
        /// Project id.
        project_id: String,
        /// Claim name.
        claim: String,
        /// Config map name.
        config_map: String,
    },
    /// Project resources could not be created.
    #[serde(rename = "resources.failed")]
    ResourcesFailed {
        /// Project id.
        project_id: String,
        /// Error text.
        error: String,
    },
    /// A step was marked running.
    #[serde(rename = "step.started")]
    StepStarted {
        /// Run id.
        run_id: Uuid,
        /// Zero-based position.
        index: usize,
        /// Step name.
        step: String,
    },
    /// A step completed.
    #[serde(rename = "step.completed")]
    StepCompleted {
        /// Run id.
        run_id: Uuid,
        /// Zero-based position.
        index: usize,
        /// Step name.
        step: String,
        /// Outcome message.
        message: String,
    },
    /// A step failed.
    #[serde(rename = "step.failed")]
    StepFailed {
        /// Run id.
        run_id: Uuid,
        /// Zero-based position.
        index: usize,
        /// Step name.
        step: String,
        /// Failure message.
        message: String,
    },
    /// Every step completed.
    #[serde(rename = "workflow.completed")]
    WorkflowCompleted {
        /// Run id.
        run_id: Uuid,
        /// Wall-clock duration.
        duration_ms: u64,
    },
    /// The run stopped at a failed step.
    #[serde(rename = "workflow.failed")]
    WorkflowFailed {
        /// Run id.
        run_id: Uuid,
        /// Wall-clock duration.
        duration_ms: u64,
        /// Error summary.
        error: String,
    },
}

impl WorkflowEvent {
    /// The dotted event type, e.g. `step.failed`.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::WorkflowStarted { .. } => "workflow.started",
            Self::ResourcesProvisioned { .. } => "resources.provisioned",
            Self::ResourcesFailed { .. } => "resources.failed",
            Self::StepStarted { .. } => "step.started",
            Self::StepCompleted { .. } => "step.completed",
            Self::StepFailed { .. } => "step.failed",
            Self::WorkflowCompleted { .. } => "workflow.completed",
            Self::WorkflowFailed { .. } => "workflow.failed",
        }
    }

    /// True for the failure events.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::ResourcesFailed { .. } | Self::StepFailed { .. } | Self::WorkflowFailed { .. }
        )
    }

    /// Returns the event as JSON, including its `type` field.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
