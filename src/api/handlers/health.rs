use axum::Json;
use serde::Serialize;

use crate::api::response::JSend;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

pub async fn health() -> Json<JSend<HealthResponse>> {
    JSend::success(HealthResponse {
        status: "ok".to_string(),
    })
}
