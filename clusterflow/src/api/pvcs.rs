use super::{created_at, require, ApiError, AppState};
use crate::cluster::{ClaimManifest, Resource, ResourceStatus};
use crate::core::ResourceKind;
use axum::extract::{Path, State};
use axum::extract::rejection::JsonRejection;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct CreateClaim {
    #[serde(default)]
    name: String,
    namespace: Option<String>,
    #[serde(default = "default_size")]
    size: String,
    #[serde(default = "default_storage_class")]
    storage_class: String,
}

fn default_size() -> String {
    "1Gi".to_string()
}

fn default_storage_class() -> String {
    "standard".to_string()
}

fn summary(resource: &Resource) -> Value {
    let (phase, capacity, storage_class) = match &resource.status {
        ResourceStatus::Claim {
            phase,
            capacity,
            storage_class,
        } => (phase.clone(), capacity.clone(), storage_class.clone()),
        _ => (None, None, None),
    };
    json!({
        "name": resource.name,
        "namespace": resource.namespace,
        "status": phase,
        "capacity": capacity,
        "storageClass": storage_class,
        "createdAt": created_at(resource),
    })
}

pub(super) async fn list(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let claims = state.store.list(ResourceKind::PersistentVolumeClaim).await?;
    let items: Vec<Value> = claims.iter().map(summary).collect();
    Ok(Json(json!({ "success": true, "count": items.len(), "pvcs": items })))
}

pub(super) async fn create(
    State(state): State<AppState>,
    payload: Result<Json<CreateClaim>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = payload?;
    let name = require("name", &request.name)?;
    let namespace = state.namespace(request.namespace.as_deref());

    let manifest = ClaimManifest::new(name, &request.size, &request.storage_class).build();
    let claim = state.store.create(&namespace, &manifest).await?;
    info!(namespace = %claim.namespace, name = %claim.name, size = %request.size, "claim created");

    Ok(Json(json!({
        "success": true,
        "message": "PVC created successfully",
        "pvc": summary(&claim),
    })))
}

pub(super) async fn read(
    State(state): State<AppState>,
    Path((namespace, name)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let claim = state
        .store
        .read(&namespace, ResourceKind::PersistentVolumeClaim, &name)
        .await?;
    Ok(Json(json!({ "success": true, "pvc": summary(&claim) })))
}

pub(super) async fn delete(
    State(state): State<AppState>,
    Path((namespace, name)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    state
        .store
        .delete(&namespace, ResourceKind::PersistentVolumeClaim, &name)
        .await?;
    info!(namespace = %namespace, name = %name, "claim deleted");
    Ok(Json(json!({
        "success": true,
        "message": format!("PVC {name} deleted successfully"),
    })))
}
