use super::{created_at, require, ApiError, AppState};
use crate::cluster::{JobCounts, JobManifest, Resource, ResourceStatus};
use crate::core::ResourceKind;
use axum::extract::{Path, State};
use axum::extract::rejection::JsonRejection;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct CreateJob {
    #[serde(default)]
    name: String,
    #[serde(default)]
    image: String,
    namespace: Option<String>,
    command: Option<Vec<String>>,
    timeout_seconds: Option<u64>,
}

fn counts(resource: &Resource) -> JobCounts {
    match &resource.status {
        ResourceStatus::Job(counts) => *counts,
        _ => JobCounts::default(),
    }
}

fn summary(resource: &Resource) -> Value {
    let counts = counts(resource);
    json!({
        "name": resource.name,
        "namespace": resource.namespace,
        "active": counts.active,
        "succeeded": counts.succeeded,
        "failed": counts.failed,
        "createdAt": created_at(resource),
    })
}

async fn create_job(state: &AppState, request: &CreateJob) -> Result<Resource, ApiError> {
    let name = require("name", &request.name)?;
    let image = require("image", &request.image)?;
    let namespace = state.namespace(request.namespace.as_deref());

    let mut manifest = JobManifest::new(name, image);
    if let Some(command) = request.command.clone().filter(|command| !command.is_empty()) {
        manifest = manifest.with_command(command);
    }
    let job = state.store.create(&namespace, &manifest.build()).await?;
    info!(namespace = %job.namespace, name = %job.name, "job created");
    Ok(job)
}

pub(super) async fn list(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let jobs = state.store.list(ResourceKind::Job).await?;
    let items: Vec<Value> = jobs.iter().map(summary).collect();
    Ok(Json(json!({ "success": true, "count": items.len(), "jobs": items })))
}

pub(super) async fn create(
    State(state): State<AppState>,
    payload: Result<Json<CreateJob>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = payload?;
    let job = create_job(&state, &request).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Job created successfully",
        "job": { "name": job.name, "namespace": job.namespace },
    })))
}

pub(super) async fn create_and_watch(
    State(state): State<AppState>,
    payload: Result<Json<CreateJob>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = payload?;
    let job = create_job(&state, &request).await?;
    let outcome = state
        .watcher
        .watch_job(&job.namespace, &job.name, request.timeout_seconds.map(Duration::from_secs))
        .await;

    Ok(Json(json!({
        "success": outcome.succeeded,
        "message": outcome.message,
        "terminalState": outcome.terminal_state,
        "job": {
            "name": job.name,
            "namespace": job.namespace,
            "succeeded": outcome.succeeded_count,
            "failed": outcome.failed_count,
        },
    })))
}

pub(super) async fn read(
    State(state): State<AppState>,
    Path((namespace, name)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let job = state.store.read(&namespace, ResourceKind::Job, &name).await?;
    Ok(Json(json!({ "success": true, "job": summary(&job) })))
}

pub(super) async fn delete(
    State(state): State<AppState>,
    Path((namespace, name)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    state.store.delete(&namespace, ResourceKind::Job, &name).await?;
    info!(namespace = %namespace, name = %name, "job deleted");
    Ok(Json(json!({
        "success": true,
        "message": format!("Job {name} deleted successfully"),
    })))
}
