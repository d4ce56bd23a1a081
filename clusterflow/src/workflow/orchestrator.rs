//! Runs workflow steps in order, stopping at the first failure.

use super::{StepExecutor, WorkflowResult, WorkflowStep};
use crate::core::StepStatus;
use crate::events::{EventSink, WorkflowEvent};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Sequential, fail-fast step runner.
///
/// Resources created by completed steps are left in place when a later step
/// fails; their names stay in the step results.
#[derive(Clone)]
pub struct WorkflowOrchestrator {
    executor: Arc<dyn StepExecutor>,
    events: Arc<dyn EventSink>,
}

impl std::fmt::Debug for WorkflowOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowOrchestrator").finish_non_exhaustive()
    }
}

impl WorkflowOrchestrator {
    /// Creates an orchestrator.
    #[must_use]
    pub fn new(executor: Arc<dyn StepExecutor>, events: Arc<dyn EventSink>) -> Self {
        Self { executor, events }
    }

    /// Runs `steps` in `namespace`.
    ///
    /// Every step starts `Pending`. Each is marked `Running`, executed and
    /// finished as `Completed` or `Failed`. The first failure sets
    /// `overall_success` to false and leaves later steps `Pending`.
    pub async fn run_workflow(&self, project_id: &str, namespace: &str, steps: &[WorkflowStep]) -> WorkflowResult {
        let started = Instant::now();
        let mut result = WorkflowResult::pending(steps);
        let run_id = result.run_id;

        info!(%run_id, project_id, namespace, steps = steps.len(), "workflow started");
        self.events
            .emit(WorkflowEvent::WorkflowStarted {
                run_id,
                project_id: project_id.to_string(),
                namespace: namespace.to_string(),
                steps: steps.len(),
            })
            .await;

        for (index, step) in steps.iter().enumerate() {
            let slot = &mut result.steps[index];
            if let Err(err) = slot.transition(StepStatus::Running) {
                error!(%run_id, step = %step.name, error = %err, "step not runnable");
                result.abort(format!("Failed at step: {}", step.name));
                break;
            }
            info!(%run_id, step = %step.name, position = index + 1, total = steps.len(), "step started");
            self.events
                .emit(WorkflowEvent::StepStarted {
                    run_id,
                    index,
                    step: step.name.clone(),
                })
                .await;

            let report = self.executor.run_step(step, namespace).await;

            let slot = &mut result.steps[index];
            slot.message = report.message;
            slot.resource_name = report.resource_name;
            slot.outcome = report.outcome;
            let status = if report.status == StepStatus::Completed {
                StepStatus::Completed
            } else {
                StepStatus::Failed
            };
            // Running always moves to a final status.
            let _ = slot.transition(status);
            let message = slot.message.clone().unwrap_or_default();

            if status == StepStatus::Completed {
                info!(%run_id, step = %step.name, "step completed");
                self.events
                    .emit(WorkflowEvent::StepCompleted {
                        run_id,
                        index,
                        step: step.name.clone(),
                        message,
                    })
                    .await;
                continue;
            }

            warn!(%run_id, step = %step.name, message = %message, "step failed");
            self.events
                .emit(WorkflowEvent::StepFailed {
                    run_id,
                    index,
                    step: step.name.clone(),
                    message,
                })
                .await;
            result.abort(format!("Failed at step: {}", step.name));
            break;
        }

        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        if result.overall_success {
            result.finished_at = Some(chrono::Utc::now());
            info!(%run_id, duration_ms, "workflow completed");
            self.events
                .emit(WorkflowEvent::WorkflowCompleted { run_id, duration_ms })
                .await;
        } else {
            let error = result.error.clone().unwrap_or_default();
            warn!(%run_id, duration_ms, error = %error, "workflow failed");
            self.events
                .emit(WorkflowEvent::WorkflowFailed {
                    run_id,
                    duration_ms,
                    error,
                })
                .await;
        }

        result
    }

    /// Records a run that failed before its first step, e.g. when its
    /// resources could not be provisioned. Every step stays `Pending`.
    pub async fn abandon_workflow(&self, steps: &[WorkflowStep], error: impl Into<String>) -> WorkflowResult {
        let mut result = WorkflowResult::pending(steps);
        result.abort(error);
        let run_id = result.run_id;
        let error = result.error.clone().unwrap_or_default();

        warn!(%run_id, error = %error, "workflow abandoned before its first step");
        self.events
            .emit(WorkflowEvent::WorkflowFailed {
                run_id,
                duration_ms: 0,
                error,
            })
            .await;

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CollectingEventSink;
    use crate::workflow::WorkflowStepResult;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;

    /// Completes every step except the named ones.
    #[derive(Default)]
    struct ScriptedExecutor {
        failing: HashSet<String>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedExecutor {
        fn failing(names: &[&str]) -> Self {
            Self {
                failing: names.iter().map(|name| (*name).to_string()).collect(),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl StepExecutor for ScriptedExecutor {
        async fn run_step(&self, step: &WorkflowStep, _namespace: &str) -> WorkflowStepResult {
            self.calls.lock().push(step.name.clone());
            let mut result = WorkflowStepResult::pending(&step.name);
            result.transition(StepStatus::Running).unwrap();
            result.resource_name = Some(format!("{}-job", step.name.to_lowercase()));
            if self.failing.contains(&step.name) {
                result.fail("Job failed after retries").unwrap();
            } else {
                result.message = Some("Job completed successfully".to_string());
                result.transition(StepStatus::Completed).unwrap();
            }
            result
        }
    }

    fn steps() -> Vec<WorkflowStep> {
        ["A", "B", "C"].iter().map(|name| WorkflowStep::new(*name, "job")).collect()
    }

    #[tokio::test]
    async fn test_all_steps_complete() {
        let executor = Arc::new(ScriptedExecutor::default());
        let events = Arc::new(CollectingEventSink::new());
        let orchestrator = WorkflowOrchestrator::new(executor.clone(), events.clone());

        let result = orchestrator.run_workflow("p1", "ci", &steps()).await;

        assert!(result.overall_success);
        assert!(result.error.is_none());
        assert_eq!(result.count(StepStatus::Completed), 3);
        assert_eq!(result.created_resources(), vec!["a-job", "b-job", "c-job"]);
        assert_eq!(
            events.event_types(),
            vec![
                "workflow.started",
                "step.started",
                "step.completed",
                "step.started",
                "step.completed",
                "step.started",
                "step.completed",
                "workflow.completed",
            ]
        );
    }

    #[tokio::test]
    async fn test_fail_fast() {
        let executor = Arc::new(ScriptedExecutor::failing(&["B"]));
        let events = Arc::new(CollectingEventSink::new());
        let orchestrator = WorkflowOrchestrator::new(executor.clone(), events.clone());

        let result = orchestrator.run_workflow("p1", "ci", &steps()).await;

        let statuses: Vec<_> = result.steps.iter().map(|step| step.status).collect();
        assert_eq!(statuses, vec![StepStatus::Completed, StepStatus::Failed, StepStatus::Pending]);
        assert!(!result.overall_success);
        assert_eq!(result.error.as_deref(), Some("Failed at step: B"));
        assert_eq!(result.steps[1].message.as_deref(), Some("Job failed after retries"));
        assert_eq!(*executor.calls.lock(), vec!["A".to_string(), "B".to_string()]);
        assert_eq!(events.event_types().last(), Some(&"workflow.failed"));
        assert_eq!(events.events_of_type("step.failed").len(), 1);
    }

    #[tokio::test]
    async fn test_first_step_failure() {
        let orchestrator = WorkflowOrchestrator::new(
            Arc::new(ScriptedExecutor::failing(&["A"])),
            Arc::new(CollectingEventSink::new()),
        );

        let result = orchestrator.run_workflow("p1", "ci", &steps()).await;

        assert_eq!(result.count(StepStatus::Failed), 1);
        assert_eq!(result.count(StepStatus::Pending), 2);
        assert_eq!(result.error.as_deref(), Some("Failed at step: A"));
    }

    #[tokio::test]
    async fn test_empty_workflow_succeeds() {
        let orchestrator = WorkflowOrchestrator::new(
            Arc::new(ScriptedExecutor::default()),
            Arc::new(CollectingEventSink::new()),
        );
        let result = orchestrator.run_workflow("p1", "ci", &[]).await;
        assert!(result.overall_success);
        assert!(result.steps.is_empty());
        assert!(result.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_abandoned_workflow_reports_failure() {
        let executor = Arc::new(ScriptedExecutor::default());
        let events = Arc::new(CollectingEventSink::new());
        let orchestrator = WorkflowOrchestrator::new(executor.clone(), events.clone());

        let result = orchestrator.abandon_workflow(&steps(), "claim quota exceeded").await;

        assert!(!result.overall_success);
        assert_eq!(result.count(StepStatus::Pending), 3);
        assert_eq!(result.error.as_deref(), Some("claim quota exceeded"));
        assert!(executor.calls.lock().is_empty());
        assert_eq!(
            events.events(),
            vec![WorkflowEvent::WorkflowFailed {
                run_id: result.run_id,
                duration_ms: 0,
                error: "claim quota exceeded".to_string(),
            }]
        );
    }
}
