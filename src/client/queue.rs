// Offline submission queue
// Author: kelexine (https://github.com/kelexine)

use crate::error::Result;
use crate::storage::{StateStore, StateStoreExt};
use parking_lot::Mutex;
use std::sync::Arc;

const QUEUE_KEY: &str = "velvet_canvas_queue_v2";

/// Prompts submitted while the gateway was unreachable.
///
/// Stored newest first; always handed back oldest first.
pub struct OfflineQueue {
    store: Arc<dyn StateStore>,
    lock: Mutex<()>,
}

impl OfflineQueue {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            store,
            lock: Mutex::new(()),
        }
    }

    fn load(&self) -> Result<Vec<String>> {
        Ok(self.store.get_json(QUEUE_KEY)?.unwrap_or_default())
    }

    /// Add a prompt unless the exact same string is already queued.
    /// Returns whether it was added.
    pub fn enqueue(&self, prompt: &str) -> Result<bool> {
        let _guard = self.lock.lock();
        let mut queued = self.load()?;
        if queued.iter().any(|p| p == prompt) {
            return Ok(false);
        }
        queued.insert(0, prompt.to_string());
        self.store.put_json(QUEUE_KEY, &queued)?;
        Ok(true)
    }

    /// Queued prompts in submission order, without removing them.
    pub fn pending(&self) -> Result<Vec<String>> {
        let mut queued = self.load()?;
        queued.reverse();
        Ok(queued)
    }

    /// Remove and return every queued prompt, oldest first.
    pub fn drain(&self) -> Result<Vec<String>> {
        let _guard = self.lock.lock();
        let mut queued = self.load()?;
        self.store.put_json(QUEUE_KEY, &Vec::<String>::new())?;
        queued.reverse();
        Ok(queued)
    }

    /// Put prompts (oldest first) back ahead of anything queued since.
    pub fn requeue(&self, prompts: &[String]) -> Result<()> {
        let _guard = self.lock.lock();
        let mut queued = self.load()?;
        for prompt in prompts {
            if !queued.contains(prompt) {
                // Older than everything queued so far
                queued.push(prompt.clone());
            }
        }
        self.store.put_json(QUEUE_KEY, &queued)
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.load()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn test_drain_is_fifo_and_clears() {
        let queue = OfflineQueue::new(Arc::new(MemoryStore::new()));
        assert!(queue.enqueue("first prompt").unwrap());
        assert!(queue.enqueue("second prompt").unwrap());
        assert!(!queue.enqueue("first prompt").unwrap());
        assert!(queue.enqueue("third prompt").unwrap());

        assert_eq!(
            queue.drain().unwrap(),
            vec!["first prompt", "second prompt", "third prompt"]
        );
        assert!(queue.is_empty().unwrap());
    }

    #[test]
    fn test_requeue_goes_ahead_of_newer_entries() {
        let queue = OfflineQueue::new(Arc::new(MemoryStore::new()));
        queue.enqueue("newer prompt").unwrap();
        queue
            .requeue(&["older one".to_string(), "older two".to_string()])
            .unwrap();

        assert_eq!(
            queue.pending().unwrap(),
            vec!["older two", "older one", "newer prompt"]
        );
    }
}
