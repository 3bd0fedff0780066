// [apps/coordinator/src/middleware.rs]
//! Perimeter guards applied to the agent-facing API: a bearer-token check
//! on the file-sync surface, and a health gate that rejects dispatch-path
//! requests while the coordinator is in maintenance mode.

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;
use tracing::warn;

use crate::state::AppState;

pub async fn auth_guard(State(state): State<AppState>, request: Request, next: Next) -> Result<Response, StatusCode> {
    let presented = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    match presented {
        Some(token) if token == state.agent_bearer_token.as_str() => Ok(next.run(request).await),
        _ => {
            warn!("rejected request with missing or invalid bearer token");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

pub async fn health_guard(State(state): State<AppState>, request: Request, next: Next) -> Result<Response, StatusCode> {
    match state.is_operational() {
        Ok(()) => Ok(next.run(request).await),
        Err(reason) => {
            warn!(reason, "rejected request while coordinator is in maintenance mode");
            Err(StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}
