//! End-to-end validation runs against the in-memory cluster.

use super::*;
use crate::cluster::{InMemoryCluster, JobCounts, ResourceStatus, ResourceStore};
use crate::core::{ResourceKind, StepStatus, TerminalState};
use crate::events::{CollectingEventSink, WorkflowEvent};
use crate::templates::{BuiltinTemplates, DirectoryTemplates, TemplateSource};
use crate::watch::{CompletionWatcher, WatchConfig};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

fn validation(
    cluster: &InMemoryCluster,
    templates: Arc<dyn TemplateSource>,
) -> (ValidationWorkflow, Arc<CollectingEventSink>) {
    let shared = Arc::new(cluster.clone());
    let events = Arc::new(CollectingEventSink::new());
    let watcher = CompletionWatcher::new(shared.clone(), shared.clone(), WatchConfig::default());
    let runner = StepRunner::new(shared.clone(), templates, watcher);
    let orchestrator = WorkflowOrchestrator::new(Arc::new(runner), events.clone());
    let provisioner = ResourceProvisioner::new(shared, events.clone(), ProvisioningConfig::default());
    (
        ValidationWorkflow::new(provisioner, orchestrator, "default", "bash:latest"),
        events,
    )
}

fn complete_after(cluster: &InMemoryCluster, job: &str, secs: u64) {
    cluster.script(
        ResourceKind::Job,
        job,
        vec![
            (Duration::from_secs(1), ResourceStatus::Job(JobCounts::new(1, 0, 0))),
            (Duration::from_secs(secs), ResourceStatus::Job(JobCounts::new(0, 1, 0))),
        ],
    );
}

fn jobs_created(cluster: &InMemoryCluster) -> Vec<String> {
    cluster
        .created()
        .into_iter()
        .filter(|(kind, _)| *kind == ResourceKind::Job)
        .map(|(_, name)| name)
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_validation_workflow_succeeds() {
    let cluster = InMemoryCluster::new();
    complete_after(&cluster, "p1-plugin-check", 3);
    complete_after(&cluster, "p1-builder", 20);
    complete_after(&cluster, "p1-volume-copy", 5);
    let (workflow, events) = validation(&cluster, Arc::new(BuiltinTemplates::new()));

    let run = workflow
        .run_validation_workflow(&ValidationRequest::new("p1", "Project One", "gs://bucket/p1"))
        .await
        .unwrap();

    assert!(run.succeeded());
    assert_eq!(run.summary(), "Validation workflow completed successfully");
    assert_eq!(run.namespace, "default");
    assert_eq!(run.resources, Some(ProvisionedResources::for_project("p1")));
    assert_eq!(run.workflow.count(StepStatus::Completed), 3);
    assert_eq!(jobs_created(&cluster), vec!["p1-plugin-check", "p1-builder", "p1-volume-copy"]);

    let builder = cluster.read("default", ResourceKind::Job, "p1-builder").await.unwrap();
    assert_eq!(builder.status, ResourceStatus::Job(JobCounts::new(0, 1, 0)));

    let config = cluster.read("default", ResourceKind::ConfigMap, "p1-config").await.unwrap();
    match config.status {
        ResourceStatus::ConfigMap { data } => {
            assert_eq!(data["SOURCE_PATH"], "gs://bucket/p1");
            assert_eq!(data["BUILDER_IMAGE"], "bash:latest");
            assert_eq!(data["PROJECT_NAME"], "Project One");
        }
        other => panic!("unexpected status: {other:?}"),
    }

    let types = events.event_types();
    assert_eq!(types.first(), Some(&"resources.provisioned"));
    assert_eq!(types.last(), Some(&"workflow.completed"));
    assert_eq!(events.events_of_type("step.completed").len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_failed_step_stops_the_pipeline() {
    let cluster = InMemoryCluster::new();
    complete_after(&cluster, "p2-plugin-check", 2);
    cluster.script(
        ResourceKind::Job,
        "p2-builder",
        vec![
            (Duration::from_secs(5), ResourceStatus::Job(JobCounts::new(1, 0, 3))),
            (Duration::from_secs(5), ResourceStatus::Job(JobCounts::new(0, 0, 4))),
        ],
    );
    let (workflow, events) = validation(&cluster, Arc::new(BuiltinTemplates::new()));

    let run = workflow
        .run_validation_workflow(&ValidationRequest::new("p2", "Project Two", "src").with_namespace("ci"))
        .await
        .unwrap();

    let statuses: Vec<_> = run.workflow.steps.iter().map(|step| step.status).collect();
    assert_eq!(statuses, vec![StepStatus::Completed, StepStatus::Failed, StepStatus::Pending]);
    assert!(!run.succeeded());
    assert_eq!(run.summary(), "Validation workflow failed");
    assert_eq!(run.workflow.error.as_deref(), Some("Failed at step: Builder"));

    let builder = &run.workflow.steps[1];
    assert_eq!(builder.message.as_deref(), Some("Job failed after retries"));
    assert_eq!(builder.outcome.as_ref().map(|o| o.failed_count), Some(Some(4)));

    assert!(!cluster.was_created(ResourceKind::Job, "p2-volume-copy"));
    assert_eq!(run.workflow.created_resources(), vec!["p2-plugin-check", "p2-builder"]);
    assert_eq!(events.event_types().last(), Some(&"workflow.failed"));
}

#[tokio::test(start_paused = true)]
async fn test_step_timeout_fails_the_pipeline() {
    let cluster = InMemoryCluster::new();
    let shared = Arc::new(cluster.clone());
    let watcher = CompletionWatcher::new(shared.clone(), shared.clone(), WatchConfig::default());
    let runner = StepRunner::new(shared, Arc::new(BuiltinTemplates::new()), watcher);
    let orchestrator = WorkflowOrchestrator::new(Arc::new(runner), Arc::new(CollectingEventSink::new()));

    let resources = ProvisionedResources::for_project("p3");
    let mut steps = ValidationWorkflow::steps("p3", &resources, "bash:latest");
    steps[0] = steps[0].clone().with_timeout(Duration::from_secs(30));

    let result = orchestrator.run_workflow("p3", "ci", &steps).await;

    assert_eq!(result.steps[0].status, StepStatus::Failed);
    assert_eq!(
        result.steps[0].outcome.as_ref().map(|o| o.terminal_state),
        Some(TerminalState::TimedOut)
    );
    assert_eq!(result.count(StepStatus::Pending), 2);
}

#[tokio::test(start_paused = true)]
async fn test_provisioning_failure_runs_no_steps() {
    let cluster = InMemoryCluster::new();
    cluster.fail_creates(ResourceKind::PersistentVolumeClaim);
    let (workflow, events) = validation(&cluster, Arc::new(BuiltinTemplates::new()));

    let run = workflow
        .run_validation_workflow(&ValidationRequest::new("p4", "Project Four", "src"))
        .await
        .unwrap();

    assert!(run.resources.is_none());
    assert!(!run.workflow.overall_success);
    assert_eq!(run.workflow.steps.len(), 3);
    assert_eq!(run.workflow.count(StepStatus::Pending), 3);
    assert_eq!(run.workflow.count(StepStatus::Running), 0);
    assert_eq!(run.workflow.count(StepStatus::Completed), 0);
    assert!(run
        .workflow
        .error
        .as_deref()
        .is_some_and(|error| error.starts_with("Failed to provision resources for project 'p4'")));
    assert!(cluster.created().is_empty());
    assert_eq!(events.event_types(), vec!["resources.failed", "workflow.failed"]);
    let failed = events.events_of_type("workflow.failed");
    assert!(matches!(
        &failed[0],
        WorkflowEvent::WorkflowFailed { run_id, error, .. }
            if *run_id == run.workflow.run_id && Some(error.as_str()) == run.workflow.error.as_deref()
    ));
}

#[tokio::test]
async fn test_invalid_request_creates_nothing() {
    let cluster = InMemoryCluster::new();
    let (workflow, events) = validation(&cluster, Arc::new(BuiltinTemplates::new()));

    let err = workflow
        .run_validation_workflow(&ValidationRequest::new("Bad_Id", "Name", "src"))
        .await
        .unwrap_err();

    assert!(err.to_string().starts_with("Invalid projectId"));
    assert!(cluster.created().is_empty());
    assert!(events.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_directory_templates_drive_the_pipeline() {
    let dir = tempfile::TempDir::new().unwrap();
    for id in ["plugin-check-job", "builder-job", "volume-copy-job"] {
        let template = format!(
            "apiVersion: batch/v1\nkind: Job\nmetadata:\n  name: '{{{{JOB_NAME}}}}'\n  labels:\n    step: {id}\n    run: '{{{{TIMESTAMP}}}}'\nspec:\n  template:\n    spec:\n      restartPolicy: Never\n      containers:\n        - name: main\n          image: busybox:1.36\n          envFrom:\n            - configMapRef:\n                name: '{{{{CONFIG_MAP}}}}'\n"
        );
        std::fs::write(dir.path().join(format!("{id}.yaml")), template).unwrap();
    }
    let templates = DirectoryTemplates::load(dir.path()).unwrap();

    let cluster = InMemoryCluster::new();
    complete_after(&cluster, "p5-plugin-check", 1);
    complete_after(&cluster, "p5-builder", 1);
    complete_after(&cluster, "p5-volume-copy", 1);
    let (workflow, _events) = validation(&cluster, Arc::new(templates));

    let run = workflow
        .run_validation_workflow(&ValidationRequest::new("p5", "Project Five", "src"))
        .await
        .unwrap();

    assert!(run.succeeded());
    let job = cluster.read("default", ResourceKind::Job, "p5-builder").await.unwrap();
    assert_eq!(job.labels["step"], "builder-job");
    assert!(job.labels["run"].parse::<i64>().is_ok());
}
