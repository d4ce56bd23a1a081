//! Mapping of service errors onto HTTP responses.

use crate::errors::{ClusterError, WorkflowError};
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::warn;

/// An error returned by a handler.
///
/// Rendered as `{"success": false, "error": "..."}`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request body is missing or has unusable fields.
    #[error("{0}")]
    BadRequest(String),

    /// A cluster call failed.
    #[error(transparent)]
    Cluster(#[from] ClusterError),

    /// A workflow could not start.
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
}

impl ApiError {
    /// The HTTP status for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_)
            | Self::Cluster(ClusterError::InvalidManifest(_))
            | Self::Workflow(WorkflowError::MissingField(_) | WorkflowError::InvalidField { .. }) => {
                StatusCode::BAD_REQUEST
            }
            Self::Cluster(ClusterError::NotFound { .. }) => StatusCode::NOT_FOUND,
            Self::Cluster(ClusterError::AlreadyExists { .. }) => StatusCode::CONFLICT,
            Self::Cluster(_) | Self::Workflow(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(status = status.as_u16(), error = %self, "request failed");
        }
        (status, Json(json!({ "success": false, "error": self.to_string() }))).into_response()
    }
}
