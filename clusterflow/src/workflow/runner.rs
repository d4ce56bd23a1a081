//! Executes a single workflow step.

use super::{WorkflowStep, WorkflowStepResult};
use crate::cluster::ResourceStore;
use crate::core::{StepStatus, WatchOutcome};
use crate::errors::ClusterflowError;
use crate::templates::{Bindings, TemplateSource};
use crate::watch::CompletionWatcher;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Runs one step and reports its final status.
#[async_trait]
pub trait StepExecutor: Send + Sync {
    /// Runs `step` in `namespace`.
    ///
    /// The returned result is `Completed` or `Failed`; errors are folded
    /// into the result message.
    async fn run_step(&self, step: &WorkflowStep, namespace: &str) -> WorkflowStepResult;
}

/// Renders a step's manifest, creates it and watches pods and jobs to completion.
#[derive(Clone)]
pub struct StepRunner {
    store: Arc<dyn ResourceStore>,
    templates: Arc<dyn TemplateSource>,
    watcher: CompletionWatcher,
}

impl std::fmt::Debug for StepRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepRunner")
            .field("templates", &self.templates.template_ids())
            .field("watcher", &self.watcher)
            .finish_non_exhaustive()
    }
}

struct Executed {
    resource_name: String,
    message: String,
    outcome: Option<WatchOutcome>,
}

impl StepRunner {
    /// Creates a runner.
    #[must_use]
    pub fn new(store: Arc<dyn ResourceStore>, templates: Arc<dyn TemplateSource>, watcher: CompletionWatcher) -> Self {
        Self {
            store,
            templates,
            watcher,
        }
    }

    /// Step bindings layered over the run defaults.
    fn bindings(step: &WorkflowStep) -> Bindings {
        let mut bindings = Bindings::new();
        bindings.insert("TIMESTAMP".to_string(), Utc::now().timestamp_millis().to_string());
        bindings.extend(step.bindings.iter().map(|(k, v)| (k.clone(), v.clone())));
        bindings
    }

    async fn execute(&self, step: &WorkflowStep, namespace: &str) -> Result<Executed, ClusterflowError> {
        let manifest = self.templates.render(&step.template, &Self::bindings(step))?;
        let kind = manifest.kind();

        let resource = self.store.create(namespace, &manifest).await?;
        info!(step = %step.name, %kind, namespace, name = %resource.name, "resource created");

        if !kind.is_watchable() {
            return Ok(Executed {
                message: format!("{kind} {} created", resource.name),
                resource_name: resource.name,
                outcome: None,
            });
        }

        let target = self.watcher.target(kind, namespace, resource.name.clone(), step.timeout);
        let outcome = self.watcher.watch_until_complete(&target).await;
        Ok(Executed {
            resource_name: resource.name,
            message: outcome.message.clone(),
            outcome: Some(outcome),
        })
    }
}

#[async_trait]
impl StepExecutor for StepRunner {
    async fn run_step(&self, step: &WorkflowStep, namespace: &str) -> WorkflowStepResult {
        let mut result = WorkflowStepResult::pending(&step.name);
        // A fresh result is always pending.
        let _ = result.transition(StepStatus::Running);
        debug!(step = %step.name, template = %step.template, namespace, "running step");

        let status = match self.execute(step, namespace).await {
            Ok(executed) => {
                let succeeded = executed.outcome.as_ref().map_or(true, |outcome| outcome.succeeded);
                result.resource_name = Some(executed.resource_name);
                result.message = Some(executed.message);
                result.outcome = executed.outcome;
                if succeeded {
                    StepStatus::Completed
                } else {
                    StepStatus::Failed
                }
            }
            Err(err) => {
                warn!(step = %step.name, error = %err, "step failed before completion");
                result.message = Some(err.to_string());
                StepStatus::Failed
            }
        };

        let _ = result.transition(status);
        result
    }
}
