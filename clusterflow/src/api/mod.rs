//! HTTP surface.
//!
//! Thin handlers over the cluster store, the completion watcher and the
//! validation workflow. Every response is JSON; failures use the
//! [`ApiError`] envelope.

mod config_maps;
mod error;
mod jobs;
mod pods;
mod pvcs;
mod workflows;

pub use error::ApiError;

use crate::cluster::{EventStream, Resource, ResourceStore};
use crate::config::ServiceConfig;
use crate::events::{EventSink, LoggingEventSink};
use crate::templates::TemplateSource;
use crate::watch::CompletionWatcher;
use crate::workflow::{ResourceProvisioner, StepRunner, ValidationWorkflow, WorkflowOrchestrator};
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    store: Arc<dyn ResourceStore>,
    watcher: CompletionWatcher,
    validation: ValidationWorkflow,
    templates: Arc<dyn TemplateSource>,
    default_namespace: String,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("default_namespace", &self.default_namespace)
            .field("templates", &self.templates.template_ids())
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Wires the watcher, the step runner and the validation workflow
    /// over one cluster backend.
    pub fn new(
        store: Arc<dyn ResourceStore>,
        events: Arc<dyn EventStream>,
        templates: Arc<dyn TemplateSource>,
        config: &ServiceConfig,
    ) -> Self {
        let sink: Arc<dyn EventSink> = Arc::new(LoggingEventSink::info());
        let watcher = CompletionWatcher::new(store.clone(), events, config.watch.clone());
        let runner = StepRunner::new(store.clone(), templates.clone(), watcher.clone());
        let orchestrator = WorkflowOrchestrator::new(Arc::new(runner), sink.clone());
        let provisioner = ResourceProvisioner::new(store.clone(), sink, config.provisioning.clone());
        let validation = ValidationWorkflow::new(
            provisioner,
            orchestrator,
            config.default_namespace.clone(),
            config.builder_image.clone(),
        );

        Self {
            store,
            watcher,
            validation,
            templates,
            default_namespace: config.default_namespace.clone(),
        }
    }

    fn namespace(&self, requested: Option<&str>) -> String {
        requested
            .filter(|ns| !ns.trim().is_empty())
            .map_or_else(|| self.default_namespace.clone(), str::to_string)
    }
}

/// Builds the service router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/templates", get(list_templates))
        .route("/pods", get(pods::list))
        .route("/pods/create", post(pods::create))
        .route("/pods/create-and-watch", post(pods::create_and_watch))
        .route("/pods/{namespace}/{name}", get(pods::read).delete(pods::delete))
        .route("/jobs", get(jobs::list))
        .route("/jobs/create", post(jobs::create))
        .route("/jobs/create-and-watch", post(jobs::create_and_watch))
        .route("/jobs/{namespace}/{name}", get(jobs::read).delete(jobs::delete))
        .route("/pvcs", get(pvcs::list))
        .route("/pvcs/create", post(pvcs::create))
        .route("/pvcs/{namespace}/{name}", get(pvcs::read).delete(pvcs::delete))
        .route("/configmaps", get(config_maps::list))
        .route("/configmaps/create", post(config_maps::create))
        .route(
            "/configmaps/{namespace}/{name}",
            get(config_maps::read).delete(config_maps::delete),
        )
        .route("/workflows/validation", post(workflows::run_validation))
        .with_state(state)
}

/// Serves the router on an already bound listener until the task is dropped.
///
/// # Errors
///
/// Returns the I/O error that stopped the server.
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "clusterflow listening");
    }
    axum::serve(listener, router(state)).await
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn list_templates(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "success": true, "templates": state.templates.template_ids() }))
}

fn require<'a>(field: &str, value: &'a str) -> Result<&'a str, ApiError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::BadRequest(format!("Missing required field: {field}")));
    }
    Ok(trimmed)
}

fn created_at(resource: &Resource) -> Value {
    json!(resource.created_at.map(|at| at.to_rfc3339()))
}
