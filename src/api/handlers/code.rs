use axum::extract::State;
use std::sync::Arc;
use tracing::{error, info};

use crate::api::response::ApiError;
use crate::bus::DeliveryEvent;
use crate::codes::unix_now;
use crate::storage::models::AccessCode;
use crate::AppState;

// ============================================================================
// Handlers
// ============================================================================

/// Show the current access code on the receiver again.
///
/// The code's usage marker is reset so the next controller to claim it
/// hides the prompt.
pub async fn reveal_code(State(state): State<Arc<AppState>>) -> Result<&'static str, ApiError> {
    let now = unix_now();

    let code = state
        .store
        .current_active(state.config.codes.ttl_seconds, now)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to look up active access code");
            ApiError::internal("Failed to look up access code")
        })?
        .ok_or_else(|| ApiError::not_found("No active access code"))?;

    state.store.mark_used(&code.code, 0).await.map_err(|e| {
        error!(code = %code.code, error = %e, "Failed to reset access code");
        ApiError::internal("Failed to reset access code")
    })?;

    let code = AccessCode {
        last_update: 0,
        ..code
    };
    state
        .bus
        .publish(&DeliveryEvent::code_reveal(&code))
        .await
        .map_err(|e| {
            error!(code = %code.code, error = %e, "Failed to publish code reveal");
            ApiError::internal("Failed to publish access code")
        })?;

    info!(code = %code.code, "Access code revealed");
    Ok("OK")
}
