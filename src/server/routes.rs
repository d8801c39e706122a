// HTTP routes configuration
// Author: kelexine (https://github.com/kelexine)

use super::edge::{chat_handler, EdgeRouter};
use super::handlers::{
    create_session_handler, delete_session_handler, health_handler, list_sessions_handler,
    metrics_handler, not_found_handler, session_stats_handler, styles_handler,
};
use super::middleware::{cors_layer, request_id_layers};
use crate::config::AppConfig;
use crate::error::Result;
use crate::session::SessionRegistry;
use axum::{
    routing::{any, delete, get},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub registry: Arc<SessionRegistry>,
    pub edge: Arc<EdgeRouter>,
}

impl AppState {
    pub fn new(config: AppConfig, registry: Arc<SessionRegistry>, edge: EdgeRouter) -> Self {
        Self {
            config: Arc::new(config),
            registry,
            edge: Arc::new(edge),
        }
    }
}

pub fn create_router(state: AppState) -> Result<Router> {
    let body_limit = state.config.server.body_limit_bytes;
    let (set_request_id, propagate_request_id) = request_id_layers();

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/api/styles", get(styles_handler))
        .route(
            "/api/sessions",
            get(list_sessions_handler).post(create_session_handler),
        )
        .route("/api/sessions/stats", get(session_stats_handler))
        .route("/api/sessions/:session_id", delete(delete_session_handler))
        .route("/api/chat/:session_id/*rest", any(chat_handler))
        .fallback(not_found_handler)
        .layer(tower_http::limit::RequestBodyLimitLayer::new(body_limit))
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
        .layer(propagate_request_id)
        .layer(set_request_id)
        .with_state(state);

    Ok(app)
}
