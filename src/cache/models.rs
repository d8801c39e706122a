//! Cache entry and statistics models.

// Author: kelexine (https://github.com/kelexine)

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

/// A previously generated image as it is persisted in a session's store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedImage {
    /// Base64-encoded image bytes.
    pub image: String,
    /// Seed the image was generated with, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u32>,
}

impl CachedImage {
    pub fn new(image: &[u8], seed: Option<u32>) -> Self {
        Self {
            image: STANDARD.encode(image),
            seed,
        }
    }

    /// Decode the stored image back into raw bytes.
    pub fn image_bytes(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(&self.image)
    }
}

/// Statistics for cache operations.
#[derive(Debug, Default, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    /// Number of lookups served from the cache.
    pub hits: u64,
    /// Number of lookups that found nothing.
    pub misses: u64,
    /// Number of entries written.
    pub writes: u64,
}
