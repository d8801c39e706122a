// Studio client: submits prompts, keeps the gallery, replays the offline queue
// Author: kelexine (https://github.com/kelexine)

use super::gallery::{Gallery, SavedImage};
use super::queue::OfflineQueue;
use crate::error::{GatewayError, Result};
use crate::orchestrator::{GenerateRequest, GenerationResult, SessionGateway};
use crate::server::GenerateResponse;
use crate::storage::{StateStore, StateStoreExt};
use crate::utils::logging::truncate_prompt;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const SESSION_KEY: &str = "velvet_session_id";

/// Anything that can turn a request into an image: the gateway over HTTP,
/// or a session gateway in the same process.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn generate(&self, request: &GenerateRequest) -> Result<GenerationResult>;
}

#[async_trait]
impl GenerationBackend for SessionGateway {
    async fn generate(&self, request: &GenerateRequest) -> Result<GenerationResult> {
        SessionGateway::generate(self, request).await
    }
}

#[async_trait]
impl<B: GenerationBackend + ?Sized> GenerationBackend for Arc<B> {
    async fn generate(&self, request: &GenerateRequest) -> Result<GenerationResult> {
        (**self).generate(request).await
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    retry_after: Option<u64>,
}

/// Talks to a running gateway at `/api/chat/{session_id}/generate`.
pub struct HttpBackend {
    http_client: Client,
    generate_url: String,
}

impl HttpBackend {
    pub fn new(server_url: &str, session_id: &str) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(10))
            .use_rustls_tls()
            .build()
            .map_err(|e| GatewayError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            generate_url: format!(
                "{}/api/chat/{}/generate",
                server_url.trim_end_matches('/'),
                session_id
            ),
        })
    }

    /// Map a non-2xx response back onto the error it was built from.
    fn error_from_response(status: StatusCode, retry_header: Option<u64>, body: &str) -> GatewayError {
        let parsed: Option<ErrorBody> = serde_json::from_str(body).ok();
        let message = parsed
            .as_ref()
            .map(|b| b.error.clone())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));

        match status {
            StatusCode::BAD_REQUEST => GatewayError::Validation(message),
            StatusCode::TOO_MANY_REQUESTS => GatewayError::RateLimited {
                retry_after_secs: parsed
                    .and_then(|b| b.retry_after)
                    .or(retry_header)
                    .unwrap_or(crate::server::DEFAULT_RETRY_AFTER_SECS),
            },
            _ => match message.strip_prefix("Agent routing failed: ") {
                Some(reason) => GatewayError::Routing(reason.to_string()),
                None => GatewayError::Upstream(message),
            },
        }
    }
}

#[async_trait]
impl GenerationBackend for HttpBackend {
    async fn generate(&self, request: &GenerateRequest) -> Result<GenerationResult> {
        let response = self
            .http_client
            .post(&self.generate_url)
            .json(request)
            .send()
            .await
            .map_err(|e| GatewayError::Unreachable(e.to_string()))?;

        let status = response.status();
        let retry_header = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let body = response.text().await?;

        if !status.is_success() {
            return Err(Self::error_from_response(status, retry_header, &body));
        }

        let parsed: GenerateResponse = serde_json::from_str(&body)?;
        let image = STANDARD
            .decode(&parsed.image)
            .map_err(|e| GatewayError::Upstream(format!("gateway returned invalid image data: {}", e)))?;

        Ok(GenerationResult {
            image: Bytes::from(image),
            seed: parsed.seed,
            cached: parsed.cached,
        })
    }
}

/// How a submission reached the studio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitMode {
    /// Typed by the user; the result becomes the current image.
    Interactive,
    /// Replayed from the offline queue; saved but never shown as current.
    Background,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Generated { image: SavedImage, cached: bool },
    /// The gateway was unreachable; the prompt waits in the offline queue.
    Queued,
}

#[derive(Debug, Default)]
pub struct ReplayReport {
    pub completed: Vec<SavedImage>,
    /// Prompts dropped after a permanent failure, with the reason.
    pub failed: Vec<(String, String)>,
    /// Prompts put back because the gateway was unreachable or cooling down.
    pub requeued: usize,
}

/// Conditions that should leave a prompt queued rather than dropped.
fn should_wait(err: &GatewayError) -> bool {
    matches!(err, GatewayError::Unreachable(_) | GatewayError::RateLimited { .. })
}

pub struct Studio<B: GenerationBackend> {
    backend: B,
    gallery: Gallery,
    queue: OfflineQueue,
    current: Option<SavedImage>,
}

impl<B: GenerationBackend> Studio<B> {
    pub fn new(backend: B, store: Arc<dyn StateStore>, gallery_max_images: usize) -> Self {
        Self {
            backend,
            gallery: Gallery::new(store.clone(), gallery_max_images),
            queue: OfflineQueue::new(store),
            current: None,
        }
    }

    pub fn gallery(&self) -> &Gallery {
        &self.gallery
    }

    pub fn queue(&self) -> &OfflineQueue {
        &self.queue
    }

    /// The last interactive result, if any.
    pub fn current(&self) -> Option<&SavedImage> {
        self.current.as_ref()
    }

    async fn process(&mut self, request: &GenerateRequest, mode: SubmitMode) -> Result<(SavedImage, bool)> {
        let result = self.backend.generate(request).await?;
        let saved = SavedImage::new(request.prompt.trim(), &result.image, result.seed);
        self.gallery.save(saved.clone())?;
        if mode == SubmitMode::Interactive {
            self.current = Some(saved.clone());
        }
        Ok((saved, result.cached))
    }

    /// Submit interactively. An unreachable gateway queues the prompt
    /// instead of failing.
    pub async fn submit(&mut self, request: GenerateRequest) -> Result<SubmitOutcome> {
        match self.process(&request, SubmitMode::Interactive).await {
            Ok((image, cached)) => Ok(SubmitOutcome::Generated { image, cached }),
            Err(GatewayError::Unreachable(reason)) => {
                info!("Gateway unreachable ({}), queueing \"{}\"", reason, truncate_prompt(&request.prompt));
                self.queue.enqueue(request.prompt.trim())?;
                Ok(SubmitOutcome::Queued)
            }
            Err(e) => Err(e),
        }
    }

    /// Replay queued prompts one at a time, oldest first.
    pub async fn replay_queue(&mut self) -> Result<ReplayReport> {
        let backlog = self.queue.drain()?;
        let mut report = ReplayReport::default();
        if backlog.is_empty() {
            return Ok(report);
        }
        info!("Replaying {} queued prompt(s)", backlog.len());

        for (index, prompt) in backlog.iter().enumerate() {
            let request = GenerateRequest::new(prompt.as_str());
            match self.process(&request, SubmitMode::Background).await {
                Ok((image, _)) => {
                    debug!("Replayed \"{}\"", truncate_prompt(prompt));
                    report.completed.push(image);
                }
                Err(e) if should_wait(&e) => {
                    warn!("Replay paused: {}", e);
                    let rest = &backlog[index..];
                    self.queue.requeue(rest)?;
                    report.requeued = rest.len();
                    break;
                }
                Err(e) => {
                    warn!("Dropping queued prompt \"{}\": {}", truncate_prompt(prompt), e);
                    report.failed.push((prompt.clone(), e.to_string()));
                }
            }
        }

        Ok(report)
    }
}

/// The session id this client profile talks to, created on first use.
pub fn profile_session_id(store: &dyn StateStore) -> Result<String> {
    if let Some(id) = store.get_json::<String>(SESSION_KEY)? {
        return Ok(id);
    }
    let id = uuid::Uuid::new_v4().to_string();
    store.put_json(SESSION_KEY, &id)?;
    Ok(id)
}
