// Workers AI REST client for text-to-image models
// Author: kelexine (https://github.com/kelexine)

use super::{GenerationParams, ImageModel};
use crate::config::UpstreamConfig;
use crate::error::{GatewayError, Result};
use crate::utils::logging;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error};

/// Client for a hosted text-to-image model.
///
/// Each call is a single attempt; retries belong to the orchestrator.
pub struct WorkersAiClient {
    http_client: Client,
    run_url: String,
    api_token: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    #[serde(default)]
    result: Option<ApiResult>,
    #[serde(default)]
    errors: Vec<ApiMessage>,
}

#[derive(Debug, Deserialize)]
struct ApiResult {
    image: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    message: String,
}

impl WorkersAiClient {
    /// Build a client from configuration.
    ///
    /// Missing credentials are a configuration error, not an upstream one.
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let (account_id, api_token) = config.credentials()?;

        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Some(Duration::from_secs(60)))
            .use_rustls_tls()
            .build()
            .map_err(|e| GatewayError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        let run_url = format!(
            "{}/accounts/{}/ai/run/{}",
            config.api_base_url.trim_end_matches('/'),
            account_id,
            config.model
        );

        Ok(Self {
            http_client,
            run_url,
            api_token: api_token.to_string(),
            model: config.model.clone(),
        })
    }

    /// Extract error messages from an API response JSON
    fn extract_error_message(response_text: &str) -> Option<String> {
        let envelope: ApiEnvelope = serde_json::from_str(response_text).ok()?;
        if envelope.errors.is_empty() {
            return None;
        }
        Some(
            envelope
                .errors
                .into_iter()
                .map(|e| e.message)
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// Some deployments answer with JSON carrying a base64 image instead of
    /// raw bytes.
    fn decode_json_image(body: &[u8]) -> Result<Bytes> {
        let envelope: ApiEnvelope = serde_json::from_slice(body)
            .map_err(|e| GatewayError::Upstream(format!("Response parsing error: {}", e)))?;

        if !envelope.errors.is_empty() {
            let messages: Vec<_> = envelope.errors.into_iter().map(|e| e.message).collect();
            return Err(GatewayError::Upstream(messages.join("; ")));
        }

        let encoded = envelope
            .result
            .and_then(|r| r.image)
            .ok_or_else(|| GatewayError::Upstream("Response contained no image".to_string()))?;

        STANDARD
            .decode(encoded.as_bytes())
            .map(Bytes::from)
            .map_err(|e| GatewayError::Upstream(format!("Invalid base64 image: {}", e)))
    }
}

#[async_trait]
impl ImageModel for WorkersAiClient {
    async fn generate(&self, params: &GenerationParams) -> Result<Bytes> {
        debug!("Calling {} (seed {})", self.model, params.seed);

        let response = self
            .http_client
            .post(&self.run_url)
            .bearer_auth(&self.api_token)
            .json(params)
            .send()
            .await
            .map_err(|e| GatewayError::Upstream(format!("HTTP error: {}", e)))?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        let body = response
            .bytes()
            .await
            .map_err(|e| GatewayError::Upstream(format!("Failed to read response body: {}", e)))?;

        if !status.is_success() {
            let text = String::from_utf8_lossy(&body);
            error!("Image model error: HTTP {} - {}", status, logging::sanitize(&text));
            let message = Self::extract_error_message(&text).unwrap_or_else(|| text.to_string());
            return Err(GatewayError::Upstream(format!("HTTP {}: {}", status.as_u16(), message)));
        }

        let image = if content_type.starts_with("application/json") {
            Self::decode_json_image(&body)?
        } else {
            body
        };

        if image.is_empty() {
            return Err(GatewayError::Upstream("Empty image returned".to_string()));
        }

        debug!("Received {} bytes from {}", image.len(), self.model);
        Ok(image)
    }

    fn name(&self) -> &str {
        &self.model
    }
}
