//! Per-session generation pipeline.
//!
//! A [`SessionGateway`] owns one session's admission counter and result
//! cache and runs every generation through the same sequence:
//!
//! ```text
//! Validating -> RateLimitCheck -> CacheLookup -> CacheHit
//!                                             -> UpstreamAttempt(1..n) -> Success
//!                                                                      -> ExhaustedRetries
//! ```
//!
//! Nothing is resumable: each call runs the machine from the top. Only the
//! counter and the cache persist between calls.
//!
//! There is no cancellation. A caller that stops waiting simply drops the
//! future's result; an attempt already sent upstream still completes.
//!
//! Author: kelexine (<https://github.com/kelexine>)

pub mod presets;

use crate::cache::{fingerprint, CacheStats, ResultCache};
use crate::config::{GenerationConfig, RateLimitConfig, UpstreamConfig};
use crate::error::{GatewayError, Result};
use crate::limiter::{Admission, Clock, LimiterStats, RateLimiter};
use crate::metrics;
use crate::storage::StoreProvider;
use crate::upstream::{GenerationParams, ImageModel};
use crate::utils::logging::truncate_prompt;
use crate::utils::retry::{with_retry, RetryPolicy};
use bytes::Bytes;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Largest seed handed to the model (`2^31 - 1`).
pub const MAX_SEED: u32 = i32::MAX as u32;

/// Body of `POST /generate`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_negative_prompt(mut self, negative: impl Into<String>) -> Self {
        self.negative_prompt = Some(negative.into());
        self
    }

    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style = Some(style.into());
        self
    }
}

/// What a successful generation hands back. The cache keeps the durable copy.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationResult {
    pub image: Bytes,
    pub seed: Option<u32>,
    pub cached: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validating,
    RateLimitCheck,
    CacheLookup,
    CacheHit,
    UpstreamAttempt(u32),
    Success,
    ExhaustedRetries,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Validating => write!(f, "validating"),
            Stage::RateLimitCheck => write!(f, "rate_limit_check"),
            Stage::CacheLookup => write!(f, "cache_lookup"),
            Stage::CacheHit => write!(f, "cache_hit"),
            Stage::UpstreamAttempt(n) => write!(f, "upstream_attempt_{}", n),
            Stage::Success => write!(f, "success"),
            Stage::ExhaustedRetries => write!(f, "exhausted_retries"),
        }
    }
}

/// Counters exposed by `GET /messages`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub session_id: String,
    pub cache: CacheStats,
    pub cache_entries: usize,
    pub admissions: LimiterStats,
    pub requests_this_window: u32,
    pub upstream_attempts: u64,
}

pub struct SessionGateway {
    session_id: String,
    limiter: RateLimiter,
    cache: ResultCache,
    model: Option<Arc<dyn ImageModel>>,
    num_steps: u32,
    guidance: f32,
    default_negative_prompt: String,
    generation: GenerationConfig,
    upstream_attempts: AtomicU64,
}

impl SessionGateway {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    fn enter(&self, stage: Stage) {
        debug!(session = %self.session_id, %stage, "generation stage");
    }

    /// Check the prompt and resolve the style. Returns the effective prompt.
    fn validate(&self, request: &GenerateRequest) -> Result<String> {
        let prompt = request.prompt.trim();
        if prompt.chars().count() < self.generation.min_prompt_chars {
            return Err(GatewayError::Validation(format!(
                "Prompt must be at least {} characters",
                self.generation.min_prompt_chars
            )));
        }

        match request.style.as_deref().filter(|s| !s.trim().is_empty()) {
            None => Ok(prompt.to_string()),
            Some(id) => presets::find_preset(id.trim())
                .map(|preset| preset.apply(prompt))
                .ok_or_else(|| GatewayError::Validation(format!("Unknown style '{}'", id))),
        }
    }

    fn attempt_params(&self, prompt: &str, negative_prompt: Option<&str>) -> GenerationParams {
        GenerationParams {
            prompt: prompt.to_string(),
            negative_prompt: negative_prompt
                .unwrap_or(&self.default_negative_prompt)
                .to_string(),
            num_steps: self.num_steps,
            guidance: self.guidance,
            seed: rand::thread_rng().gen_range(0..=MAX_SEED),
        }
    }

    /// Run one request through the pipeline.
    pub async fn generate(&self, request: &GenerateRequest) -> Result<GenerationResult> {
        let result = self.run(request).await;
        let outcome = match &result {
            Ok(r) if r.cached => "cached",
            Ok(_) => "generated",
            Err(e) => e.kind(),
        };
        metrics::record_generation(outcome);
        result
    }

    async fn run(&self, request: &GenerateRequest) -> Result<GenerationResult> {
        self.enter(Stage::Validating);
        let prompt = self.validate(request)?;
        let model = self.model.clone().ok_or_else(|| {
            GatewayError::Config("Image model binding not found. Check upstream configuration.".to_string())
        })?;

        self.enter(Stage::RateLimitCheck);
        if let Admission::Denied { retry_after_secs } = self.limiter.admit()? {
            info!(
                session = %self.session_id,
                "Rate limited, retry after {}s", retry_after_secs
            );
            return Err(GatewayError::RateLimited { retry_after_secs });
        }

        self.enter(Stage::CacheLookup);
        let negative = request.negative_prompt.as_deref().filter(|s| !s.is_empty());
        let key = fingerprint(&prompt, negative);
        if let Some(hit) = self.cache.lookup(&key)? {
            self.enter(Stage::CacheHit);
            metrics::record_cache_operation("hit");
            let image = hit
                .image_bytes()
                .map_err(|e| GatewayError::Storage(format!("cached image is not valid base64: {}", e)))?;
            return Ok(GenerationResult {
                image: Bytes::from(image),
                seed: hit.seed,
                cached: true,
            });
        }
        metrics::record_cache_operation("miss");

        let policy = RetryPolicy::new(
            self.generation.max_attempts,
            Duration::from_millis(self.generation.backoff_base_ms),
        );
        let outcome = with_retry("Image generation", policy, |attempt| {
            let model = model.clone();
            let params = self.attempt_params(&prompt, negative);
            async move {
                self.enter(Stage::UpstreamAttempt(attempt));
                self.upstream_attempts.fetch_add(1, Ordering::Relaxed);

                let started = Instant::now();
                let result = model.generate(&params).await;
                metrics::record_upstream_call(model.name(), result.is_ok(), started.elapsed().as_secs_f64());

                match result {
                    Ok(image) => Ok((image, params.seed)),
                    Err(e) => {
                        warn!(
                            session = %self.session_id,
                            attempt,
                            prompt = %truncate_prompt(&params.prompt),
                            "Upstream attempt failed: {}", e
                        );
                        Err(e)
                    }
                }
            }
        })
        .await;

        let (image, seed) = match outcome {
            Ok(generated) => generated,
            Err(e) => {
                self.enter(Stage::ExhaustedRetries);
                return Err(e);
            }
        };

        self.cache.store(&key, &image, Some(seed))?;
        metrics::record_cache_operation("write");
        self.enter(Stage::Success);

        Ok(GenerationResult {
            image,
            seed: Some(seed),
            cached: false,
        })
    }

    pub fn stats(&self) -> Result<SessionStats> {
        Ok(SessionStats {
            session_id: self.session_id.clone(),
            cache: self.cache.stats(),
            cache_entries: self.cache.len()?,
            admissions: self.limiter.stats(),
            requests_this_window: self.limiter.current_count()?,
            upstream_attempts: self.upstream_attempts.load(Ordering::Relaxed),
        })
    }
}

/// Builds one [`SessionGateway`] per session from shared configuration.
pub struct GatewayFactory {
    provider: Arc<dyn StoreProvider>,
    model: Option<Arc<dyn ImageModel>>,
    clock: Arc<dyn Clock>,
    upstream: UpstreamConfig,
    generation: GenerationConfig,
    rate_limit: RateLimitConfig,
}

impl GatewayFactory {
    pub fn new(
        provider: Arc<dyn StoreProvider>,
        model: Option<Arc<dyn ImageModel>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            provider,
            model,
            clock,
            upstream: UpstreamConfig::default(),
            generation: GenerationConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }

    pub fn with_upstream(mut self, upstream: UpstreamConfig) -> Self {
        self.upstream = upstream;
        self
    }

    pub fn with_generation(mut self, generation: GenerationConfig) -> Self {
        self.generation = generation;
        self
    }

    pub fn with_rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    pub fn build(&self, session_id: &str) -> Result<SessionGateway> {
        let store = self.provider.open(session_id)?;
        Ok(SessionGateway {
            session_id: session_id.to_string(),
            limiter: RateLimiter::new(store.clone(), self.clock.clone(), &self.rate_limit),
            cache: ResultCache::new(store),
            model: self.model.clone(),
            num_steps: self.upstream.num_steps,
            guidance: self.upstream.guidance,
            default_negative_prompt: self.upstream.default_negative_prompt.clone(),
            generation: self.generation.clone(),
            upstream_attempts: AtomicU64::new(0),
        })
    }
}
