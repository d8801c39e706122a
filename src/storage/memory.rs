// In-memory state store
// Author: kelexine (https://github.com/kelexine)

use super::{StateStore, StoreProvider};
use crate::error::Result;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Process-local store. Contents are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl StateStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.entries.write().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.entries.write().remove(key).is_some())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .entries
            .read()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn update(
        &self,
        key: &str,
        f: &mut dyn FnMut(Option<Vec<u8>>) -> Result<Option<Vec<u8>>>,
    ) -> Result<()> {
        let mut entries = self.entries.write();
        if let Some(value) = f(entries.get(key).cloned())? {
            entries.insert(key.to_string(), value);
        }
        Ok(())
    }
}

/// Hands out one [`MemoryStore`] per scope and keeps it alive for the
/// lifetime of the provider, so dropping a session handle does not reset
/// its counters.
#[derive(Default)]
pub struct MemoryStoreProvider {
    stores: RwLock<HashMap<String, Arc<MemoryStore>>>,
}

impl StoreProvider for MemoryStoreProvider {
    fn open(&self, scope: &str) -> Result<Arc<dyn StateStore>> {
        if let Some(store) = self.stores.read().get(scope) {
            return Ok(store.clone());
        }
        let store = self
            .stores
            .write()
            .entry(scope.to_string())
            .or_insert_with(|| Arc::new(MemoryStore::new()))
            .clone();
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_delete() {
        let store = MemoryStore::new();
        assert_eq!(store.get("a").unwrap(), None);

        store.put("a", b"1").unwrap();
        assert_eq!(store.get("a").unwrap(), Some(b"1".to_vec()));

        assert!(store.delete("a").unwrap());
        assert!(!store.delete("a").unwrap());
        assert!(store.is_empty());
    }

    #[test]
    fn test_update_can_leave_value_untouched() {
        let store = MemoryStore::new();
        store.update("n", &mut |_| Ok(Some(b"1".to_vec()))).unwrap();
        store.update("n", &mut |_| Ok(None)).unwrap();
        assert_eq!(store.get("n").unwrap(), Some(b"1".to_vec()));
    }

    #[test]
    fn test_provider_returns_same_store_per_scope() {
        let provider = MemoryStoreProvider::default();
        provider.open("abc").unwrap().put("k", b"v").unwrap();

        assert_eq!(provider.open("abc").unwrap().get("k").unwrap(), Some(b"v".to_vec()));
        assert_eq!(provider.open("other").unwrap().get("k").unwrap(), None);
    }
}
