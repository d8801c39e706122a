//! Configuration data structures for the velvet gateway.
//!
//! This module defines the schema for the application settings: the HTTP
//! server, the upstream image model, the generation pipeline, per-session
//! admission control, state storage, logging and the studio client.
//!
//! Author: kelexine (<https://github.com/kelexine>)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The root configuration object for the application.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// HTTP server settings (host, port, workers).
    #[serde(default)]
    pub server: ServerConfig,

    /// Upstream image model settings.
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Retry and validation settings for the generation pipeline.
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Per-session fixed-window admission control.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Where per-session state (counters, cached images) lives.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging and observability settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Settings for the studio client subcommands.
    #[serde(default)]
    pub client: ClientConfig,
}

/// Settings for the built-in HTTP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The IP address or hostname the server should bind to.
    /// Default: `127.0.0.1`
    #[serde(default = "default_host")]
    pub host: String,

    /// The port number the server should listen on.
    /// Default: `8080`
    #[serde(default = "default_port")]
    pub port: u16,

    /// Number of tokio worker threads.
    /// Default: Number of logical CPU cores.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Maximum accepted request body in bytes.
    /// Default: `1 MiB`
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

/// Settings for the hosted image model (Workers AI REST API).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL of the REST API, without the account segment.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Account that owns the model binding. Required to generate.
    #[serde(default)]
    pub account_id: Option<String>,

    /// Bearer token for the API. Required to generate.
    #[serde(default)]
    pub api_token: Option<String>,

    /// Model identifier.
    /// Default: `@cf/stabilityai/stable-diffusion-xl-base-1.0`
    #[serde(default = "default_model")]
    pub model: String,

    /// Per-attempt request timeout in seconds.
    /// Default: `60`
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Diffusion step count sent with every attempt.
    /// Default: `20`
    #[serde(default = "default_num_steps")]
    pub num_steps: u32,

    /// Classifier-free guidance scale.
    /// Default: `7.5`
    #[serde(default = "default_guidance")]
    pub guidance: f32,

    /// Negative prompt used when the caller does not supply one.
    #[serde(default = "default_negative_prompt")]
    pub default_negative_prompt: String,
}

/// Settings for validation and the upstream retry loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Total upstream attempts per generation, including the first.
    /// Default: `3`
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base of the exponential backoff; retry `n` waits `base * 2^n`.
    /// Default: `300`
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Minimum prompt length after trimming whitespace.
    /// Default: `5`
    #[serde(default = "default_min_prompt_chars")]
    pub min_prompt_chars: usize,
}

/// Settings for fixed-window rate limiting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Requests admitted per session per window.
    /// Default: `10`
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,

    /// Window length in seconds, aligned to the epoch.
    /// Default: `60`
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
}

/// Backend used for per-session state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    File,
}

/// Settings for the per-session state store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// `memory` (lost on restart) or `file` (survives restarts).
    /// Default: `file`
    #[serde(default = "default_backend")]
    pub backend: StorageBackend,

    /// Root directory for the `file` backend.
    /// Default: `~/.velvet-gateway/sessions`
    #[serde(default = "default_sessions_dir")]
    pub data_dir: PathBuf,
}

/// Settings for application logging and output format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Minimum log level (`trace`, `debug`, `info`, `warn`, `error`).
    /// Default: `info`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format for logs (`pretty`, `json`).
    /// Default: `pretty`
    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Settings for the studio client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Gateway the client talks to.
    /// Default: `http://127.0.0.1:8080`
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Maximum number of images kept in the local gallery.
    /// Default: `50`
    #[serde(default = "default_gallery_max_images")]
    pub gallery_max_images: usize,

    /// Directory holding the gallery and the offline queue.
    /// Default: `~/.velvet-gateway/studio`
    #[serde(default = "default_studio_dir")]
    pub data_dir: PathBuf,
}

// Default trait implementations linking to custom logic

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            workers: default_workers(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            account_id: None,
            api_token: None,
            model: default_model(),
            timeout_seconds: default_timeout(),
            num_steps: default_num_steps(),
            guidance: default_guidance(),
            default_negative_prompt: default_negative_prompt(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            min_prompt_chars: default_min_prompt_chars(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_seconds: default_window_seconds(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            data_dir: default_sessions_dir(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            gallery_max_images: default_gallery_max_images(),
            data_dir: default_studio_dir(),
        }
    }
}

// Helper functions for serde defaults and shared constants
fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_workers() -> usize {
    num_cpus::get()
}

fn default_body_limit() -> usize {
    1024 * 1024
}

fn default_api_base_url() -> String {
    "https://api.cloudflare.com/client/v4".to_string()
}

fn default_model() -> String {
    "@cf/stabilityai/stable-diffusion-xl-base-1.0".to_string()
}

fn default_timeout() -> u64 {
    60
}

fn default_num_steps() -> u32 {
    20
}

fn default_guidance() -> f32 {
    7.5
}

pub(crate) fn default_negative_prompt() -> String {
    "blurry, low quality, distorted, watermark, lowres, text, deformed".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    300
}

fn default_min_prompt_chars() -> usize {
    5
}

fn default_max_requests() -> u32 {
    10
}

fn default_window_seconds() -> u64 {
    60
}

fn default_backend() -> StorageBackend {
    StorageBackend::File
}

/// `~/.velvet-gateway`, falling back to the working directory.
pub fn app_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".velvet-gateway")
}

fn default_sessions_dir() -> PathBuf {
    app_home().join("sessions")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_server_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_gallery_max_images() -> usize {
    50
}

fn default_studio_dir() -> PathBuf {
    app_home().join("studio")
}
