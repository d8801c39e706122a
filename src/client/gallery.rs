// Local gallery of generated images
// Author: kelexine (https://github.com/kelexine)
//
// Newest first, one entry per prompt (case-insensitive), truncated to a
// fixed capacity on every save.

use crate::error::{GatewayError, Result};
use crate::storage::{StateStore, StateStoreExt};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

const GALLERY_KEY: &str = "velvet_canvas_gallery_v3";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedImage {
    pub id: String,
    pub prompt: String,
    /// Base64-encoded image bytes.
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u32>,
    /// Milliseconds since the epoch.
    pub timestamp: i64,
}

impl SavedImage {
    pub fn new(prompt: impl Into<String>, image: &[u8], seed: Option<u32>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            prompt: prompt.into(),
            image: STANDARD.encode(image),
            seed,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn image_bytes(&self) -> Result<Vec<u8>> {
        STANDARD
            .decode(&self.image)
            .map_err(|e| GatewayError::Storage(format!("gallery image {} is corrupt: {}", self.id, e)))
    }

    fn size_bytes(&self) -> usize {
        // Decoded length without decoding; malformed strings clamp to zero
        let padding = self.image.chars().rev().take_while(|c| *c == '=').count();
        (self.image.len() / 4 * 3).saturating_sub(padding)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageInfo {
    pub count: usize,
    pub size_bytes: usize,
}

pub struct Gallery {
    store: Arc<dyn StateStore>,
    max_images: usize,
    write_lock: Mutex<()>,
}

impl Gallery {
    pub fn new(store: Arc<dyn StateStore>, max_images: usize) -> Self {
        Self {
            store,
            max_images: max_images.max(1),
            write_lock: Mutex::new(()),
        }
    }

    /// All saved images, newest first.
    pub fn list(&self) -> Result<Vec<SavedImage>> {
        Ok(self.store.get_json(GALLERY_KEY)?.unwrap_or_default())
    }

    pub fn get(&self, id: &str) -> Result<Option<SavedImage>> {
        Ok(self.list()?.into_iter().find(|img| img.id == id))
    }

    /// Insert at the front, replacing any entry with the same prompt
    /// (ignoring case), then truncate to capacity.
    pub fn save(&self, image: SavedImage) -> Result<()> {
        let _guard = self.write_lock.lock();
        let prompt = image.prompt.to_lowercase();

        let mut images = self.list()?;
        images.retain(|img| img.prompt.to_lowercase() != prompt);
        images.insert(0, image);
        if images.len() > self.max_images {
            debug!("Gallery over capacity, dropping {} oldest", images.len() - self.max_images);
            images.truncate(self.max_images);
        }

        self.store.put_json(GALLERY_KEY, &images)
    }

    /// Returns whether an entry was removed.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let _guard = self.write_lock.lock();
        let mut images = self.list()?;
        let before = images.len();
        images.retain(|img| img.id != id);
        if images.len() == before {
            return Ok(false);
        }
        self.store.put_json(GALLERY_KEY, &images)?;
        Ok(true)
    }

    pub fn storage_info(&self) -> Result<StorageInfo> {
        let images = self.list()?;
        Ok(StorageInfo {
            count: images.len(),
            size_bytes: images.iter().map(SavedImage::size_bytes).sum(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn gallery(cap: usize) -> Gallery {
        Gallery::new(Arc::new(MemoryStore::new()), cap)
    }

    #[test]
    fn test_duplicate_prompt_moves_to_front() {
        let gallery = gallery(50);
        gallery.save(SavedImage::new("A Sunset Over Mountains", b"one", None)).unwrap();
        gallery.save(SavedImage::new("a red fox", b"two", None)).unwrap();
        gallery.save(SavedImage::new("a sunset over mountains", b"three", None)).unwrap();

        let images = gallery.list().unwrap();
        assert_eq!(images.len(), 2);
        assert_eq!(images[0].prompt, "a sunset over mountains");
        assert_eq!(images[0].image_bytes().unwrap(), b"three");
        assert_eq!(images[1].prompt, "a red fox");
    }

    #[test]
    fn test_truncates_to_capacity() {
        let gallery = gallery(3);
        for i in 0..5 {
            gallery.save(SavedImage::new(format!("prompt number {}", i), b"x", None)).unwrap();
        }
        let prompts: Vec<_> = gallery.list().unwrap().into_iter().map(|i| i.prompt).collect();
        assert_eq!(prompts, vec!["prompt number 4", "prompt number 3", "prompt number 2"]);
    }

    #[test]
    fn test_delete_and_storage_info() {
        let gallery = gallery(50);
        let keep = SavedImage::new("keep this one", b"12345", None);
        let drop = SavedImage::new("drop this one", b"1", None);
        let drop_id = drop.id.clone();
        gallery.save(keep.clone()).unwrap();
        gallery.save(drop).unwrap();

        assert!(gallery.delete(&drop_id).unwrap());
        assert!(!gallery.delete(&drop_id).unwrap());
        assert_eq!(gallery.get(&keep.id).unwrap(), Some(keep));
        assert_eq!(
            gallery.storage_info().unwrap(),
            StorageInfo { count: 1, size_bytes: 5 }
        );
    }

    #[test]
    fn test_malformed_image_does_not_break_storage_info() {
        let gallery = gallery(50);
        let mut corrupt = SavedImage::new("corrupted on disk", b"", None);
        corrupt.image = "=".to_string();
        gallery.save(corrupt.clone()).unwrap();

        assert_eq!(
            gallery.storage_info().unwrap(),
            StorageInfo { count: 1, size_bytes: 0 }
        );
        assert!(gallery.get(&corrupt.id).unwrap().unwrap().image_bytes().is_err());
    }
}
