//! Playbook execution handlers for the REST API.
//!
//! Execution is synchronous from the caller's point of view: the response
//! carries the full execution summary. Runs in flight can be listed and
//! cancelled from other requests.

use std::time::Instant;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use serde_json::json;
use uuid::Uuid;

use playbook_core::playbook::runner::PlaybookExecutor;
use playbook_core::playbook::validation::{PlaybookError, validate_request};
use playbook_types::playbook::PlaybookRequest;

use crate::http::error::AppError;
use crate::http::response::ApiResponse;
use crate::state::AppState;

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

/// POST /api/v1/playbooks/execute - Run a playbook to completion.
pub async fn execute_playbook(
    State(state): State<AppState>,
    payload: Result<Json<PlaybookRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();
    let Json(request) = payload?;

    // Detached so the run still collects its queued tasks if the client goes away.
    let runner = state.runner.clone();
    let tasks = state.tasks.clone();
    let (summary, queued) = tokio::spawn(async move {
        let summary = runner.execute(request).await?;
        let queued = tasks.take_for_run(summary.run_id).await;
        Ok::<_, PlaybookError>((summary, queued))
    })
    .await
    .map_err(|e| AppError::Internal(format!("playbook run task failed: {e}")))??;

    tracing::info!(
        run_id = %summary.run_id,
        status = %summary.status,
        "playbook executed via API"
    );

    let data = json!({
        "execution_summary": summary,
        "queued_tasks": queued,
    });
    let resp = ApiResponse::success(data, request_id, elapsed_ms(start))
        .with_link("self", "/api/v1/playbooks/execute");

    Ok(Json(resp))
}

/// POST /api/v1/playbooks/validate - Validate a playbook without running it.
pub async fn validate_playbook(
    payload: Result<Json<PlaybookRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();
    let Json(request) = payload?;

    validate_request(&request)?;

    let unknown: Vec<String> = request
        .steps
        .iter()
        .enumerate()
        .filter(|(_, step)| step.step_type.kind().is_none())
        .map(|(index, step)| step.resolved_id(index))
        .collect();

    let data = json!({
        "valid": true,
        "workflow_id": request.workflow_id,
        "steps": request.steps.len(),
        "unknown_step_ids": unknown,
    });
    Ok(Json(ApiResponse::success(data, request_id, elapsed_ms(start))))
}

/// GET /api/v1/runs - IDs of runs currently executing.
pub async fn list_active_runs(
    State(state): State<AppState>,
) -> Json<ApiResponse<serde_json::Value>> {
    let start = Instant::now();
    let runs: Vec<String> = state
        .runner
        .active_runs()
        .into_iter()
        .map(|id| id.to_string())
        .collect();

    let resp = ApiResponse::success(
        json!({ "active_runs": runs }),
        Uuid::now_v7().to_string(),
        elapsed_ms(start),
    )
    .with_link("self", "/api/v1/runs");
    Json(resp)
}

/// POST /api/v1/runs/{run_id}/cancel - Cancel an active run.
pub async fn cancel_run(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    state.runner.cancel(run_id).await?;

    let resp = ApiResponse::success(
        json!({ "cancelled": true, "run_id": run_id.to_string() }),
        request_id,
        elapsed_ms(start),
    );
    Ok(Json(resp))
}

/// GET /api/v1/health - Liveness plus the active collaborators.
pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "analyst": state.analyst,
        "notifier": state.notifier,
        "active_runs": state.runner.active_runs().len(),
    }))
}
