pub mod routes;
pub mod ws;

use crate::state::AppState;
use std::sync::Arc;

/// Read-only HTTP + WS surface for an external dashboard.
pub fn router(state: Arc<AppState>) -> axum::Router {
    axum::Router::new()
        .route("/api/state", axum::routing::get(routes::get_state))
        .route("/api/history", axum::routing::get(routes::get_history))
        .route("/api/logs", axum::routing::get(routes::get_logs))
        .route("/api/counters", axum::routing::get(routes::get_counters))
        .route("/ws", axum::routing::get(ws::ws_handler))
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        .with_state(state)
}
