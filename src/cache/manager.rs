// Result cache - fingerprinting and content-addressed lookup
// Author: kelexine (https://github.com/kelexine)

use crate::cache::models::{CacheStats, CachedImage};
use crate::error::Result;
use crate::storage::{StateStore, StateStoreExt};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::debug;

const CACHE_KEY_PREFIX: &str = "img_cache_";

/// Lowercase hex SHA-256 of `prompt ++ negative_prompt`.
///
/// A missing negative prompt hashes as the empty string, so `None` and
/// `Some("")` share a fingerprint.
pub fn fingerprint(prompt: &str, negative_prompt: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    hasher.update(negative_prompt.unwrap_or_default().as_bytes());
    hex::encode(hasher.finalize())
}

/// Write-once, read-many image cache scoped to one session's store.
pub struct ResultCache {
    store: Arc<dyn StateStore>,
    stats: Mutex<CacheStats>,
}

impl ResultCache {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            store,
            stats: Mutex::new(CacheStats::default()),
        }
    }

    fn key(fingerprint: &str) -> String {
        format!("{}{}", CACHE_KEY_PREFIX, fingerprint)
    }

    /// Look up a fingerprint. A corrupt entry is an error, not a miss.
    pub fn lookup(&self, fingerprint: &str) -> Result<Option<CachedImage>> {
        let entry = self.store.get_json::<CachedImage>(&Self::key(fingerprint))?;

        let mut stats = self.stats.lock();
        match &entry {
            Some(_) => {
                debug!("Cache hit: {}", &fingerprint[..16.min(fingerprint.len())]);
                stats.hits += 1;
            }
            None => {
                debug!("Cache miss: {}", &fingerprint[..16.min(fingerprint.len())]);
                stats.misses += 1;
            }
        }
        Ok(entry)
    }

    /// Persist an image under its fingerprint. Overwrites are idempotent
    /// because the key is a pure function of the request.
    pub fn store(&self, fingerprint: &str, image: &[u8], seed: Option<u32>) -> Result<()> {
        self.store
            .put_json(&Self::key(fingerprint), &CachedImage::new(image, seed))?;
        self.stats.lock().writes += 1;
        Ok(())
    }

    /// Number of entries currently held for this session.
    pub fn len(&self) -> Result<usize> {
        Ok(self.store.keys_with_prefix(CACHE_KEY_PREFIX)?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        *self.stats.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatewayError;
    use crate::storage::MemoryStore;

    #[test]
    fn test_fingerprint_generation() {
        let key1 = fingerprint("a sunset over mountains", None);
        let key2 = fingerprint("a sunset over mountains", None);

        // Same inputs should produce same key
        assert_eq!(key1, key2);
        assert_eq!(key1.len(), 64);
        assert!(key1.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));

        // Different negative prompt should produce different key
        let key3 = fingerprint("a sunset over mountains", Some("blurry"));
        assert_ne!(key1, key3);

        // Missing negative prompt behaves like an empty one
        assert_eq!(key1, fingerprint("a sunset over mountains", Some("")));
    }

    #[test]
    fn test_fingerprint_is_sha256_of_concatenation() {
        assert_eq!(
            fingerprint("ab", Some("c")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_store_then_lookup() {
        let cache = ResultCache::new(Arc::new(MemoryStore::new()));
        let key = fingerprint("a red fox in snow", None);

        assert!(cache.lookup(&key).unwrap().is_none());
        cache.store(&key, b"\x89PNG", Some(42)).unwrap();

        let hit = cache.lookup(&key).unwrap().unwrap();
        assert_eq!(hit.image_bytes().unwrap(), b"\x89PNG");
        assert_eq!(hit.seed, Some(42));

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.writes), (1, 1, 1));
        assert_eq!(cache.len().unwrap(), 1);
    }

    #[test]
    fn test_corrupt_entry_is_reported() {
        let store = Arc::new(MemoryStore::new());
        let cache = ResultCache::new(store.clone());
        let key = fingerprint("a red fox in snow", None);
        store.put(&format!("img_cache_{}", key), b"{not json").unwrap();

        assert!(matches!(cache.lookup(&key), Err(GatewayError::Storage(_))));
    }
}
