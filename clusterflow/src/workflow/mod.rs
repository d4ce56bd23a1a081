//! Sequential provisioning workflows.
//!
//! A workflow is an ordered list of [`WorkflowStep`]s. Each step renders one
//! manifest, creates it and, for pods and jobs, watches it to completion.
//! The [`WorkflowOrchestrator`] runs steps in order and stops at the first
//! failure. Steps share resources created once by the
//! [`ResourceProvisioner`].

mod orchestrator;
mod provisioner;
mod runner;
mod validation;

#[cfg(test)]
mod integration_tests;

pub use orchestrator::WorkflowOrchestrator;
pub use provisioner::{ProvisionedResources, ProvisioningConfig, ResourceProvisioner};
pub use runner::{StepExecutor, StepRunner};
pub use validation::{ValidationRequest, ValidationRun, ValidationWorkflow};

use crate::core::{StepStatus, WatchOutcome};
use crate::errors::WorkflowError;
use crate::templates::Bindings;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

/// One step of a workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowStep {
    /// Display name, unique within a workflow.
    pub name: String,
    /// Template id passed to the template source.
    pub template: String,
    /// Placeholder bindings for the template.
    pub bindings: Bindings,
    /// Watch deadline. Falls back to the watcher default.
    pub timeout: Option<Duration>,
}

impl WorkflowStep {
    /// Creates a step without bindings.
    #[must_use]
    pub fn new(name: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            template: template.into(),
            bindings: Bindings::new(),
            timeout: None,
        }
    }

    /// Adds a binding.
    #[must_use]
    pub fn with_binding(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.bindings.insert(key.into(), value.into());
        self
    }

    /// Overrides the watch deadline.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Status of one step within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStepResult {
    /// Step name.
    pub name: String,
    /// Current status.
    pub status: StepStatus,
    /// Outcome or error message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Name of the resource the step created.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_name: Option<String>,
    /// When the step was marked running.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the step reached a final status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// The watch outcome, for watched resources.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<WatchOutcome>,
}

impl WorkflowStepResult {
    /// Creates a pending result.
    #[must_use]
    pub fn pending(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: StepStatus::Pending,
            message: None,
            resource_name: None,
            started_at: None,
            finished_at: None,
            outcome: None,
        }
    }

    /// Moves to `next`, stamping start and finish times.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::InvalidTransition`] unless the move is
    /// `Pending -> Running` or `Running -> Completed | Failed`.
    pub fn transition(&mut self, next: StepStatus) -> Result<(), WorkflowError> {
        if !self.status.can_transition_to(next) {
            return Err(WorkflowError::InvalidTransition {
                step: self.name.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        match next {
            StepStatus::Running => self.started_at = Some(Utc::now()),
            StepStatus::Completed | StepStatus::Failed => self.finished_at = Some(Utc::now()),
            StepStatus::Pending => {}
        }
        Ok(())
    }

    /// Finishes the step as failed with `message`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::InvalidTransition`] if the step is not running.
    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), WorkflowError> {
        self.transition(StepStatus::Failed)?;
        self.message = Some(message.into());
        Ok(())
    }
}

/// The result of one workflow run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowResult {
    /// Unique run id.
    pub run_id: Uuid,
    /// True only if every step completed.
    #[serde(rename = "success")]
    pub overall_success: bool,
    /// Per-step results in definition order.
    pub steps: Vec<WorkflowStepResult>,
    /// Why the run stopped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the run was created.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl WorkflowResult {
    /// Creates a result with every step pending.
    #[must_use]
    pub fn pending(steps: &[WorkflowStep]) -> Self {
        Self {
            run_id: Uuid::now_v7(),
            overall_success: true,
            steps: steps.iter().map(|step| WorkflowStepResult::pending(&step.name)).collect(),
            error: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Marks the run failed with `error` and stamps the finish time.
    pub fn abort(&mut self, error: impl Into<String>) {
        self.overall_success = false;
        self.error = Some(error.into());
        self.finished_at = Some(Utc::now());
    }

    /// Number of steps with the given status.
    #[must_use]
    pub fn count(&self, status: StepStatus) -> usize {
        self.steps.iter().filter(|step| step.status == status).count()
    }

    /// Names of resources created by steps of this run.
    #[must_use]
    pub fn created_resources(&self) -> Vec<&str> {
        self.steps.iter().filter_map(|step| step.resource_name.as_deref()).collect()
    }
}
