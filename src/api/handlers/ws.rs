use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::{State, WebSocketUpgrade};
use axum::response::{IntoResponse, Response};
use futures_util::StreamExt;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::api::response::ApiError;
use crate::relay::serve_connection;
use crate::AppState;

/// Upgrade a controller connection and hand it to the relay read loop.
pub async fn ws_upgrade(
    State(state): State<Arc<AppState>>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => {
            debug!(error = %rejection, "Rejected websocket upgrade");
            return ApiError::bad_request("Unable to upgrade to websockets").into_response();
        }
    };

    let max_message_size = state.config.relay.max_message_size;
    upgrade
        .max_message_size(max_message_size)
        .max_frame_size(max_message_size)
        .on_upgrade(move |socket| async move {
            let (sink, stream) = socket.split();
            serve_connection(state, stream, sink, Uuid::new_v4().to_string()).await;
        })
}
