// Inner routes served by each session's gateway
// Author: kelexine (https://github.com/kelexine)

use crate::error::GatewayError;
use crate::orchestrator::{GenerateRequest, SessionGateway};
use crate::utils::logging::truncate_prompt;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub success: bool,
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u32>,
    #[serde(default)]
    pub cached: bool,
}

/// Router for paths after the edge has stripped `/api/chat/{session_id}`.
pub fn session_service(gateway: Arc<SessionGateway>) -> Router {
    Router::new()
        .route("/generate", post(generate_handler))
        .route("/messages", get(messages_handler))
        .fallback(not_found)
        .with_state(gateway)
}

/// Handler for `POST /generate`
async fn generate_handler(
    State(gateway): State<Arc<SessionGateway>>,
    body: Bytes, // Parse manually to control the error envelope
) -> Result<Json<GenerateResponse>, GatewayError> {
    let request: GenerateRequest = serde_json::from_slice(&body)
        .map_err(|e| GatewayError::Validation(format!("Invalid request body: {}", e)))?;

    info!(
        session = %gateway.session_id(),
        "Generation request: prompt=\"{}\", style={:?}",
        truncate_prompt(&request.prompt),
        request.style
    );

    let result = gateway.generate(&request).await.map_err(|e| {
        error!(session = %gateway.session_id(), "Image generation error: {}", e);
        e
    })?;

    Ok(Json(GenerateResponse {
        success: true,
        image: STANDARD.encode(&result.image),
        seed: result.seed,
        cached: result.cached,
    }))
}

/// Handler for `GET /messages`
async fn messages_handler(
    State(gateway): State<Arc<SessionGateway>>,
) -> Result<Response, GatewayError> {
    let stats = gateway.stats()?;
    Ok(Json(json!({ "success": true, "data": stats })).into_response())
}

async fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "success": false, "error": "Not Found" })),
    )
        .into_response()
}
