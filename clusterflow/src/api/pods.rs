use super::{created_at, require, ApiError, AppState};
use crate::cluster::{PodManifest, Resource, ResourceStatus};
use crate::core::ResourceKind;
use axum::extract::{Path, State};
use axum::extract::rejection::JsonRejection;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::info;

const DEFAULT_CONTAINER_PORT: u16 = 80;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct CreatePod {
    #[serde(default)]
    name: String,
    #[serde(default)]
    image: String,
    namespace: Option<String>,
    port: Option<u16>,
    timeout_seconds: Option<u64>,
}

fn phase(resource: &Resource) -> String {
    match &resource.status {
        ResourceStatus::Pod { phase } => phase.to_string(),
        _ => "Unknown".to_string(),
    }
}

fn summary(resource: &Resource) -> Value {
    json!({
        "name": resource.name,
        "namespace": resource.namespace,
        "status": phase(resource),
        "createdAt": created_at(resource),
    })
}

async fn create_pod(state: &AppState, request: &CreatePod) -> Result<Resource, ApiError> {
    let name = require("name", &request.name)?;
    let image = require("image", &request.image)?;
    let namespace = state.namespace(request.namespace.as_deref());

    let manifest = PodManifest::new(name, image)
        .with_port(request.port.unwrap_or(DEFAULT_CONTAINER_PORT))
        .build();
    let pod = state.store.create(&namespace, &manifest).await?;
    info!(namespace = %pod.namespace, name = %pod.name, "pod created");
    Ok(pod)
}

pub(super) async fn list(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let pods = state.store.list(ResourceKind::Pod).await?;
    let items: Vec<Value> = pods.iter().map(summary).collect();
    Ok(Json(json!({ "success": true, "count": items.len(), "pods": items })))
}

pub(super) async fn create(
    State(state): State<AppState>,
    payload: Result<Json<CreatePod>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = payload?;
    let pod = create_pod(&state, &request).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Pod created successfully",
        "pod": {
            "name": pod.name,
            "namespace": pod.namespace,
            "status": phase(&pod),
        },
    })))
}

/// Creates the pod and holds the request open until it is ready, fails
/// or times out.
pub(super) async fn create_and_watch(
    State(state): State<AppState>,
    payload: Result<Json<CreatePod>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = payload?;
    let pod = create_pod(&state, &request).await?;
    let outcome = state
        .watcher
        .watch_pod(&pod.namespace, &pod.name, request.timeout_seconds.map(Duration::from_secs))
        .await;

    Ok(Json(json!({
        "success": outcome.succeeded,
        "message": outcome.message,
        "terminalState": outcome.terminal_state,
        "pod": {
            "name": pod.name,
            "namespace": pod.namespace,
            "finalPhase": outcome.final_phase,
        },
    })))
}

pub(super) async fn read(
    State(state): State<AppState>,
    Path((namespace, name)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let pod = state.store.read(&namespace, ResourceKind::Pod, &name).await?;
    let mut body = summary(&pod);
    body["labels"] = json!(pod.labels);
    Ok(Json(json!({ "success": true, "pod": body })))
}

pub(super) async fn delete(
    State(state): State<AppState>,
    Path((namespace, name)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    state.store.delete(&namespace, ResourceKind::Pod, &name).await?;
    info!(namespace = %namespace, name = %name, "pod deleted");
    Ok(Json(json!({
        "success": true,
        "message": format!("Pod {name} in namespace {namespace} deleted successfully"),
    })))
}
