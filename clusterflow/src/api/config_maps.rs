use super::{created_at, require, ApiError, AppState};
use crate::cluster::{ConfigMapManifest, Resource, ResourceStatus};
use crate::core::ResourceKind;
use axum::extract::{Path, State};
use axum::extract::rejection::JsonRejection;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::info;

#[derive(Debug, Deserialize)]
pub(super) struct CreateConfigMap {
    #[serde(default)]
    name: String,
    namespace: Option<String>,
    #[serde(default)]
    data: BTreeMap<String, String>,
}

fn data(resource: &Resource) -> BTreeMap<String, String> {
    match &resource.status {
        ResourceStatus::ConfigMap { data } => data.clone(),
        _ => BTreeMap::new(),
    }
}

/// Listings expose key names only.
fn summary(resource: &Resource) -> Value {
    let keys: Vec<String> = data(resource).into_keys().collect();
    json!({
        "name": resource.name,
        "namespace": resource.namespace,
        "keys": keys,
        "createdAt": created_at(resource),
    })
}

pub(super) async fn list(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let config_maps = state.store.list(ResourceKind::ConfigMap).await?;
    let items: Vec<Value> = config_maps.iter().map(summary).collect();
    Ok(Json(json!({ "success": true, "count": items.len(), "configMaps": items })))
}

pub(super) async fn create(
    State(state): State<AppState>,
    payload: Result<Json<CreateConfigMap>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = payload?;
    let name = require("name", &request.name)?;
    if request.data.is_empty() {
        return Err(ApiError::BadRequest("Missing required field: data".to_string()));
    }
    let namespace = state.namespace(request.namespace.as_deref());

    let manifest = ConfigMapManifest::new(name, request.data.clone()).build();
    let config_map = state.store.create(&namespace, &manifest).await?;
    info!(namespace = %config_map.namespace, name = %config_map.name, keys = request.data.len(), "config map created");

    Ok(Json(json!({
        "success": true,
        "message": "ConfigMap created successfully",
        "configMap": summary(&config_map),
    })))
}

pub(super) async fn read(
    State(state): State<AppState>,
    Path((namespace, name)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let config_map = state.store.read(&namespace, ResourceKind::ConfigMap, &name).await?;
    Ok(Json(json!({
        "success": true,
        "configMap": {
            "name": config_map.name,
            "namespace": config_map.namespace,
            "data": data(&config_map),
            "createdAt": created_at(&config_map),
        },
    })))
}

pub(super) async fn delete(
    State(state): State<AppState>,
    Path((namespace, name)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    state.store.delete(&namespace, ResourceKind::ConfigMap, &name).await?;
    info!(namespace = %namespace, name = %name, "config map deleted");
    Ok(Json(json!({
        "success": true,
        "message": format!("ConfigMap {name} deleted successfully"),
    })))
}
