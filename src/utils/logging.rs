//! Structured logging and log-hygiene helpers.
//!
//! This module configures the `tracing` ecosystem for the application,
//! supporting multiple output formats, and provides utilities that keep
//! credentials and long user prompts out of log lines.
//!
//! Author: kelexine (<https://github.com/kelexine>)

use crate::config::LoggingConfig;
use crate::error::{GatewayError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Longest prompt prefix written to logs.
pub const PROMPT_LOG_CHARS: usize = 48;

static BEARER_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)bearer\s+[A-Za-z0-9._~+/=-]+").expect("static regex is valid")
});

/// Initializes the global tracing subscriber for the application.
///
/// Supports two output formats:
/// - `json`: Structured JSON logs for production ingestion.
/// - `pretty` (default): Human-readable, colorized output for development.
///
/// Log levels are controlled via the `RUST_LOG` environment variable or
/// the provided `LoggingConfig`.
pub fn init(config: &LoggingConfig) -> Result<()> {
    // Configure filter from environment or config file
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    let installed = match config.format.as_str() {
        "json" => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
        _ => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init(),
    };

    installed.map_err(|e| GatewayError::Internal(format!("Failed to install logger: {}", e)))
}

/// Replaces bearer credentials with a `\[REDACTED\]` placeholder.
///
/// Upstream error bodies and echoed request headers may carry the API token;
/// everything that can contain one passes through here before being logged.
pub fn sanitize(input: &str) -> String {
    BEARER_TOKEN
        .replace_all(input, "Bearer [REDACTED_API_TOKEN]")
        .into_owned()
}

/// Shortens a prompt for logging, on a character boundary.
pub fn truncate_prompt(prompt: &str) -> String {
    let trimmed = prompt.trim();
    match trimmed.char_indices().nth(PROMPT_LOG_CHARS) {
        Some((idx, _)) => format!("{}…", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_bearer_token() {
        let input = "Authorization: Bearer AbC123_-xyz.tok trailing";
        let output = sanitize(input);
        assert!(output.contains("[REDACTED_API_TOKEN]"));
        assert!(!output.contains("AbC123_-xyz.tok"));
        assert!(output.ends_with("trailing"));
    }

    #[test]
    fn test_truncate_prompt() {
        assert_eq!(truncate_prompt("  a cat  "), "a cat");

        let long = "é".repeat(100);
        let short = truncate_prompt(&long);
        assert_eq!(short.chars().count(), PROMPT_LOG_CHARS + 1);
        assert!(short.ends_with('…'));
    }
}
