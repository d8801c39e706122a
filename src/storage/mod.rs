//! Key-value state stores backing every session.
//!
//! Each session owns one [`StateStore`]: its rate-limit counters and cached
//! images live there and nowhere else. The studio client reuses the same
//! abstraction for its gallery and offline queue.
//!
//! Absent keys are `Ok(None)`; failures to read are errors, never empties.
//!
//! Author: kelexine (<https://github.com/kelexine>)

mod file;
mod memory;

pub use file::{FileStore, FileStoreProvider};
pub use memory::{MemoryStore, MemoryStoreProvider};

use crate::config::{StorageBackend, StorageConfig};
use crate::error::{GatewayError, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;

/// A byte-oriented key-value store.
pub trait StateStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    fn put(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Returns whether the key existed.
    fn delete(&self, key: &str) -> Result<bool>;

    /// Keys starting with `prefix`, in no particular order.
    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>>;

    /// Read-modify-write of one key. Updates on the same store are
    /// serialized against each other, whichever handle they come through.
    /// `f` returns the new value, or `None` to leave the key untouched.
    fn update(
        &self,
        key: &str,
        f: &mut dyn FnMut(Option<Vec<u8>>) -> Result<Option<Vec<u8>>>,
    ) -> Result<()>;
}

/// Typed helpers layered over [`StateStore`].
pub trait StateStoreExt: StateStore {
    fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key)? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| GatewayError::Storage(format!("corrupt value at '{}': {}", key, e))),
            None => Ok(None),
        }
    }

    fn put_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.put(key, &bytes)
    }
}

impl<S: StateStore + ?Sized> StateStoreExt for S {}

/// Opens the store for a scope (a session id, or a client profile).
///
/// Opening the same scope twice yields the same store, so `update` stays
/// serialized across every handle on that scope.
pub trait StoreProvider: Send + Sync {
    fn open(&self, scope: &str) -> Result<Arc<dyn StateStore>>;
}

/// Build the provider selected in configuration.
pub fn provider_from_config(config: &StorageConfig) -> Result<Arc<dyn StoreProvider>> {
    match config.backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryStoreProvider::default())),
        StorageBackend::File => Ok(Arc::new(FileStoreProvider::new(&config.data_dir)?)),
    }
}
