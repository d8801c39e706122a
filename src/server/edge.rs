// Edge routing - resolves a session and forwards into its gateway
// Author: kelexine (https://github.com/kelexine)

use super::session_routes::session_service;
use crate::error::{GatewayError, Result};
use crate::metrics;
use crate::orchestrator::{GatewayFactory, SessionGateway};
use crate::session::{is_valid_session_id, SessionRegistry};
use axum::extract::Request;
use axum::http::{header, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tower::ServiceExt;
use tracing::{debug, error};

/// Default `Retry-After` when a 429 comes back without one.
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Path prefix owned by the edge.
pub const CHAT_PREFIX: &str = "/api/chat";

/// One session's gateway plus the router that serves its inner paths.
#[derive(Clone)]
pub struct SessionHandle {
    pub gateway: Arc<SessionGateway>,
    service: Router,
}

/// Maps session ids to their gateways, creating them on first use.
pub struct EdgeRouter {
    factory: GatewayFactory,
    registry: Arc<SessionRegistry>,
    handles: RwLock<HashMap<String, SessionHandle>>,
}

impl EdgeRouter {
    pub fn new(factory: GatewayFactory, registry: Arc<SessionRegistry>) -> Self {
        Self {
            factory,
            registry,
            handles: RwLock::new(HashMap::new()),
        }
    }

    pub fn has_model(&self) -> bool {
        self.factory.has_model()
    }

    /// Find or create the handle that owns `session_id`.
    pub fn resolve(&self, session_id: &str) -> Result<SessionHandle> {
        if !is_valid_session_id(session_id) {
            return Err(GatewayError::Routing(format!("invalid session id '{}'", session_id)));
        }

        self.registry.touch(session_id);

        if let Some(handle) = self.handles.read().get(session_id) {
            return Ok(handle.clone());
        }

        let mut handles = self.handles.write();
        // Another request may have created it between the two locks
        if let Some(handle) = handles.get(session_id) {
            return Ok(handle.clone());
        }

        let gateway = self
            .factory
            .build(session_id)
            .map(Arc::new)
            .map_err(|e| GatewayError::Routing(format!("cannot open session '{}': {}", session_id, e)))?;
        let handle = SessionHandle {
            service: session_service(gateway.clone()),
            gateway,
        };
        handles.insert(session_id.to_string(), handle.clone());
        metrics::set_active_sessions(handles.len());
        debug!("Created gateway for session {}", session_id);
        Ok(handle)
    }

    /// Drop the in-memory handle. Persisted counters and cache stay in the store.
    pub fn evict(&self, session_id: &str) -> bool {
        let mut handles = self.handles.write();
        let removed = handles.remove(session_id).is_some();
        metrics::set_active_sessions(handles.len());
        removed
    }

    /// Forward `request` to the session's inner router with the
    /// `/api/chat/{session_id}` prefix stripped.
    pub async fn forward(&self, session_id: &str, request: Request) -> Result<Response> {
        let handle = self.resolve(session_id)?;
        let (mut parts, body) = request.into_parts();

        let inner_uri = rewrite_uri(&parts.uri, session_id)?;
        let method = parts.method.clone();
        let inner_path = inner_uri.path().to_string();
        debug!("Routing {} {} to session {}", method, inner_path, session_id);
        parts.uri = inner_uri;

        let response = match handle.service.oneshot(Request::from_parts(parts, body)).await {
            Ok(response) => response,
            Err(never) => match never {},
        };

        metrics::record_routed(method_label(&method), route_label(&inner_path), response.status().as_u16());
        Ok(normalize_headers(response))
    }
}

/// Metric label for an inner path. Only the session router's own routes get
/// their own series.
fn route_label(inner_path: &str) -> &'static str {
    match inner_path {
        "/generate" => "/generate",
        "/messages" => "/messages",
        _ => "other",
    }
}

fn method_label(method: &Method) -> &'static str {
    match *method {
        Method::GET => "GET",
        Method::POST => "POST",
        Method::DELETE => "DELETE",
        Method::OPTIONS => "OPTIONS",
        _ => "other",
    }
}

/// Strip the session prefix, keeping the query string.
fn rewrite_uri(uri: &Uri, session_id: &str) -> Result<Uri> {
    let prefix = format!("{}/{}", CHAT_PREFIX, session_id);
    let rest = uri
        .path()
        .strip_prefix(&prefix)
        .ok_or_else(|| GatewayError::Routing(format!("path {} is not under {}", uri.path(), prefix)))?;

    let path = if rest.is_empty() { "/" } else { rest };
    let path_and_query = match uri.query() {
        Some(query) => format!("{}?{}", path, query),
        None => path.to_string(),
    };

    Uri::builder()
        .path_and_query(path_and_query)
        .build()
        .map_err(|e| GatewayError::Routing(format!("cannot rewrite path: {}", e)))
}

/// Permissive CORS on every response, and a `Retry-After` on every 429.
pub fn normalize_headers(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));

    if response.status() == StatusCode::TOO_MANY_REQUESTS
        && !response.headers().contains_key(header::RETRY_AFTER)
    {
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(DEFAULT_RETRY_AFTER_SECS));
    }
    response
}

/// Handler for `ANY /api/chat/:session_id/*rest`
pub async fn chat_handler(
    axum::extract::State(state): axum::extract::State<super::AppState>,
    axum::extract::Path((session_id, _rest)): axum::extract::Path<(String, String)>,
    request: Request,
) -> Response {
    match state.edge.forward(&session_id, request).await {
        Ok(response) => response,
        Err(e) => {
            error!("Agent routing error for session {}: {}", session_id, e);
            let routing = match e {
                GatewayError::Routing(_) => e,
                other => GatewayError::Routing(other.to_string()),
            };
            normalize_headers(routing.into_response())
        }
    }
}
