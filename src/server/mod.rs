//! Axum-based HTTP server for the velvet gateway.
//!
//! This module sets up the edge: session management endpoints, the
//! per-session generation routes reached through `/api/chat/{sessionId}/…`,
//! and the health and metrics endpoints.
//!
//! # Components
//!
//! - `edge`: Resolves session ids to gateways, rewrites paths, normalizes headers.
//! - `session_routes`: The routes each session gateway serves after rewriting.
//! - `handlers`: Session registry, styles, health and metrics endpoints.
//! - `middleware`: Request ID tracking and CORS.
//! - `routes`: The main router configuration that ties everything together.
//!
//! Author: kelexine (<https://github.com/kelexine>)

mod edge;
mod handlers;
mod middleware;
mod routes;
mod session_routes;

pub use edge::{normalize_headers, EdgeRouter, SessionHandle, DEFAULT_RETRY_AFTER_SECS};
pub use routes::{create_router, AppState};
pub use session_routes::{session_service, GenerateResponse};
