use super::{ApiError, AppState};
use crate::workflow::ValidationRequest;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::Json;
use serde_json::{json, Value};

/// Runs the validation workflow to completion before responding.
///
/// Invalid input is a 400. A run that fails part way is still a 200 with
/// `success: false` and the per-step results.
pub(super) async fn run_validation(
    State(state): State<AppState>,
    payload: Result<Json<ValidationRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = payload?;
    let run = state.validation.run_validation_workflow(&request).await?;
    Ok(Json(json!({
        "success": run.succeeded(),
        "message": run.summary(),
        "projectId": run.project_id,
        "namespace": run.namespace,
        "resources": run.resources,
        "workflow": run.workflow,
    })))
}
