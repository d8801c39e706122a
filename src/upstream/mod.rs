//! The hosted image model, treated as an opaque capability.
//!
//! The orchestrator only ever sees [`ImageModel`]; the production binding is
//! [`WorkersAiClient`], tests substitute their own implementations.
//!
//! Author: kelexine (<https://github.com/kelexine>)

mod client;

pub use client::WorkersAiClient;

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;

/// Inputs of a single upstream attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationParams {
    pub prompt: String,
    pub negative_prompt: String,
    pub num_steps: u32,
    pub guidance: f32,
    pub seed: u32,
}

#[async_trait]
pub trait ImageModel: Send + Sync {
    /// Produce image bytes for the given parameters.
    ///
    /// Failures that a later attempt might not hit should be returned as
    /// `GatewayError::Upstream`.
    async fn generate(&self, params: &GenerationParams) -> Result<Bytes>;

    /// Name used in logs and metrics.
    fn name(&self) -> &str;
}
