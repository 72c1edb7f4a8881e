use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Controller ingest
    let relay_routes = Router::new()
        .route("/ws", get(handlers::ws_upgrade))
        .route("/ws/", get(handlers::ws_upgrade));

    // Receiver-facing routes
    let code_routes = Router::new()
        .route(
            "/code",
            get(handlers::reveal_code).post(handlers::reveal_code),
        )
        .route(
            "/code/",
            get(handlers::reveal_code).post(handlers::reveal_code),
        );

    Router::new()
        .merge(relay_routes)
        .merge(code_routes)
        .route("/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
