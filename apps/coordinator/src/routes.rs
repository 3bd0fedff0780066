// [apps/coordinator/src/routes.rs]
//! Assembles the coordinator's router: a plain `/health` probe, the
//! bearer-gated file-sync endpoint, and the per-agent websocket channel.
//! `health_guard` rejects dispatch-adjacent traffic with a 503 while the
//! coordinator is in maintenance mode; `auth_guard` checks the shared
//! agent bearer token on every route except the websocket upgrade, which
//! authenticates itself via its query parameter.

use axum::http::Method;
use axum::routing::get;
use axum::{middleware, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::middleware::{auth_guard, health_guard};
use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_methods([Method::GET, Method::POST]).allow_origin(Any).allow_headers(Any);

    let gated_routes = Router::new()
        .route("/files/:category/*name", get(handlers::files::fetch_file))
        .route_layer(middleware::from_fn_with_state(state.clone(), health_guard))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_guard));

    Router::new()
        .route("/health", get(health))
        .merge(gated_routes)
        .route("/agent/channel/:agent_id", get(handlers::ws::handle_upgrade))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
