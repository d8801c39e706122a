// Directory-backed state store
// Author: kelexine (https://github.com/kelexine)
//
// One directory per scope, one file per key. File names are the hex encoding
// of the key so arbitrary keys map to portable names. Every write goes to its
// own temp file and is renamed into place, so readers see whole values only.

use super::{StateStore, StoreProvider};
use crate::error::{GatewayError, Result};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

const TMP_SUFFIX: &str = ".tmp";

#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    update_lock: Mutex<()>,
}

impl FileStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| {
            GatewayError::Storage(format!("cannot create {}: {}", dir.display(), e))
        })?;
        Ok(Self {
            dir,
            update_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(hex::encode(key.as_bytes()))
    }
}

impl StateStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(GatewayError::Storage(format!("read '{}': {}", key, e))),
        }
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        let mut tmp = tempfile::Builder::new()
            .prefix(".")
            .suffix(TMP_SUFFIX)
            .tempfile_in(&self.dir)?;
        tmp.write_all(value)?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.path_for(key))
            .map_err(|e| GatewayError::Storage(format!("write '{}': {}", key, e.error)))?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(GatewayError::Storage(format!("delete '{}': {}", key, e))),
        }
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let name = entry?.file_name();
            let name = name.to_string_lossy();
            if name.ends_with(TMP_SUFFIX) {
                continue;
            }
            // Foreign files in the directory are skipped rather than failing
            let Some(key) = hex::decode(name.as_ref())
                .ok()
                .and_then(|raw| String::from_utf8(raw).ok())
            else {
                debug!("Skipping unrecognised file {} in {}", name, self.dir.display());
                continue;
            };
            if key.starts_with(prefix) {
                keys.push(key);
            }
        }
        Ok(keys)
    }

    fn update(
        &self,
        key: &str,
        f: &mut dyn FnMut(Option<Vec<u8>>) -> Result<Option<Vec<u8>>>,
    ) -> Result<()> {
        let _guard = self.update_lock.lock();
        if let Some(value) = f(self.get(key)?)? {
            self.put(key, &value)?;
        }
        Ok(())
    }
}

/// Opens `<root>/<scope>` as a [`FileStore`], one per scope for the
/// provider's lifetime.
pub struct FileStoreProvider {
    root: PathBuf,
    stores: RwLock<HashMap<String, Arc<FileStore>>>,
}

impl FileStoreProvider {
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|e| {
            GatewayError::Storage(format!("cannot create {}: {}", root.display(), e))
        })?;
        Ok(Self {
            root,
            stores: RwLock::new(HashMap::new()),
        })
    }
}

impl StoreProvider for FileStoreProvider {
    fn open(&self, scope: &str) -> Result<Arc<dyn StateStore>> {
        if scope.is_empty() || scope.contains(['/', '\\', '.']) {
            return Err(GatewayError::Storage(format!("invalid store scope '{}'", scope)));
        }
        if let Some(store) = self.stores.read().get(scope) {
            return Ok(store.clone());
        }

        let mut stores = self.stores.write();
        if let Some(store) = stores.get(scope) {
            return Ok(store.clone());
        }
        let store = Arc::new(FileStore::open(self.root.join(scope))?);
        stores.insert(scope.to_string(), store.clone());
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileStore::open(dir.path()).unwrap();
            store.put("rl:29000000", b"4").unwrap();
        }
        let reopened = FileStore::open(dir.path()).unwrap();
        assert_eq!(reopened.get("rl:29000000").unwrap(), Some(b"4".to_vec()));
    }

    #[test]
    fn test_keys_with_prefix_decodes_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        store.put("img_cache_ab", b"x").unwrap();
        store.put("img_cache_cd", b"y").unwrap();
        store.put("rl:1", b"1").unwrap();
        fs::write(dir.path().join("README"), b"not a key").unwrap();

        let mut keys = store.keys_with_prefix("img_cache_").unwrap();
        keys.sort();
        assert_eq!(keys, vec!["img_cache_ab", "img_cache_cd"]);
    }

    #[test]
    fn test_delete_missing_key_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        assert!(!store.delete("nope").unwrap());
    }

    #[test]
    fn test_provider_rejects_path_like_scopes() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FileStoreProvider::new(dir.path()).unwrap();
        assert!(provider.open("../escape").is_err());
        assert!(provider.open("").is_err());
        assert!(provider.open("session-1").is_ok());
    }

    #[test]
    fn test_concurrent_puts_to_one_key_all_succeed() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let size = 256 * 1024;

        for _ in 0..5 {
            std::thread::scope(|scope| {
                for writer in 0..8u8 {
                    let store = &store;
                    scope.spawn(move || {
                        store.put("img_cache_same", &vec![writer; size]).unwrap();
                    });
                }
                scope.spawn(|| {
                    for _ in 0..50 {
                        if let Some(value) = store.get("img_cache_same").unwrap() {
                            assert_eq!(value.len(), size);
                            assert!(value.iter().all(|b| *b == value[0]));
                        }
                    }
                });
            });
        }

        assert_eq!(store.keys_with_prefix("").unwrap(), vec!["img_cache_same"]);
    }

    #[test]
    fn test_provider_shares_one_store_per_scope() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FileStoreProvider::new(dir.path()).unwrap();
        let first = provider.open("session-1").unwrap();
        let second = provider.open("session-1").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
