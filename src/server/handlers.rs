// HTTP request handlers
// Author: kelexine (https://github.com/kelexine)

use super::routes::AppState;
use crate::error::GatewayError;
use crate::orchestrator::presets::STYLE_PRESETS;
use crate::session::is_valid_session_id;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use tracing::info;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub checks: HashMap<String, HealthCheck>,
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthCheck {
    pub status: String,
    pub message: String,
}

pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let mut checks = HashMap::new();
    let mut overall_status = HealthStatus::Healthy;

    // Without a model binding every uncached generation fails
    let upstream_check = if state.edge.has_model() {
        HealthCheck {
            status: "ok".to_string(),
            message: format!("Model: {}", state.config.upstream.model),
        }
    } else {
        overall_status = HealthStatus::Degraded;
        HealthCheck {
            status: "warning".to_string(),
            message: "No image model binding configured".to_string(),
        }
    };
    checks.insert("upstream".to_string(), upstream_check);

    checks.insert(
        "sessions".to_string(),
        HealthCheck {
            status: "ok".to_string(),
            message: format!("{} registered", state.registry.count()),
        },
    );

    Json(HealthResponse {
        status: overall_status,
        checks,
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

pub async fn metrics_handler() -> Response {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        crate::metrics::gather_metrics(),
    )
        .into_response()
}

/// Handler for `GET /api/sessions`
pub async fn list_sessions_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({ "success": true, "data": state.registry.list() }))
}

/// Handler for `GET /api/sessions/stats`
pub async fn session_stats_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "success": true,
        "data": { "totalSessions": state.registry.count() }
    }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionRequest {
    title: Option<String>,
    session_id: Option<String>,
}

/// Handler for `POST /api/sessions`
pub async fn create_session_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<serde_json::Value>, GatewayError> {
    // An empty body registers an anonymous session
    let req: CreateSessionRequest = if body.iter().all(u8::is_ascii_whitespace) {
        CreateSessionRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| GatewayError::Validation(format!("Invalid session request: {}", e)))?
    };

    let session_id = match req.session_id.filter(|id| !id.is_empty()) {
        Some(id) if is_valid_session_id(&id) => id,
        Some(id) => {
            return Err(GatewayError::Validation(format!("Invalid session id '{}'", id)));
        }
        None => uuid::Uuid::new_v4().to_string(),
    };

    let session = state.registry.register(&session_id, req.title.as_deref());
    info!("Registered session {} ({})", session.id, session.title);

    Ok(Json(json!({ "success": true, "data": { "sessionId": session.id } })))
}

/// Handler for `DELETE /api/sessions/:session_id`
pub async fn delete_session_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Json<serde_json::Value> {
    let deleted = state.registry.unregister(&session_id);
    state.edge.evict(&session_id);
    if deleted {
        info!("Deleted session {}", session_id);
    }
    Json(json!({ "success": deleted }))
}

/// Handler for `GET /api/styles`
pub async fn styles_handler() -> Json<serde_json::Value> {
    Json(json!({ "success": true, "data": STYLE_PRESETS }))
}

/// Fallback for unknown top-level paths
pub async fn not_found_handler() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "success": false, "error": "Not Found" })),
    )
        .into_response()
}
