//! Axum router configuration with middleware.
//!
//! All routes are under `/api/v1/`.
//! Middleware: permissive CORS, request tracing.

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

/// Build the complete API router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route(
            "/playbooks/execute",
            post(handlers::playbook::execute_playbook),
        )
        .route(
            "/playbooks/validate",
            post(handlers::playbook::validate_playbook),
        )
        .route("/runs", get(handlers::playbook::list_active_runs))
        .route("/runs/{run_id}/cancel", post(handlers::playbook::cancel_run))
        .route("/health", get(handlers::playbook::health));

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
