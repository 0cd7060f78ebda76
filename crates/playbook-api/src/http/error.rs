//! Application error type mapping to HTTP status codes and envelope format.

use axum::extract::rejection::JsonRejection;
use axum::response::{IntoResponse, Response};
use uuid::Uuid;

use playbook_core::playbook::validation::PlaybookError;

use crate::http::response::ApiResponse;

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// Malformed request body or a request that failed validation.
    Validation(String),
    /// No active run with this ID.
    RunNotFound(Uuid),
    Internal(String),
}

impl From<PlaybookError> for AppError {
    fn from(e: PlaybookError) -> Self {
        match e {
            PlaybookError::RunNotFound(run_id) => AppError::RunNotFound(run_id),
            e if e.is_input_error() => AppError::Validation(e.to_string()),
            e => AppError::Internal(e.to_string()),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(e: JsonRejection) -> Self {
        AppError::Validation(e.body_text())
    }
}

impl AppError {
    fn code_and_message(&self) -> (&'static str, String) {
        match self {
            AppError::Validation(msg) => ("VALIDATION_ERROR", msg.clone()),
            AppError::RunNotFound(run_id) => {
                ("RUN_NOT_FOUND", format!("No active run with ID {run_id}"))
            }
            AppError::Internal(msg) => ("INTERNAL_ERROR", msg.clone()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (code, message) = self.code_and_message();
        if code == "INTERNAL_ERROR" {
            tracing::error!(error = %message, "request failed");
        }
        ApiResponse::error(code, &message, Uuid::now_v7().to_string()).into_response()
    }
}
