//! Key/value backends for snapshot persistence.
//!
//! Keys are short slash-separated names such as `oracle/snapshot`; values are
//! opaque bytes. A backend must make a `set` durable before returning, since
//! the oracle publishes new state only after its snapshot was written.

use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::error::{Error, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// BACKEND TRAIT
// ═══════════════════════════════════════════════════════════════════════════════

/// Durable byte store keyed by name
pub trait StorageBackend: Send + Sync {
    /// Bytes stored under `key`
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Replace the bytes under `key`
    fn set(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Drop `key`, reporting whether it was present
    fn delete(&self, key: &str) -> Result<bool>;

    /// Whether `key` holds a value
    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Push buffered writes to disk; a no-op for write-through backends
    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Store `value` as JSON under `key`
pub fn put_json<T: Serialize>(backend: &dyn StorageBackend, key: &str, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec(value).map_err(|e| Error::Serialization(e.to_string()))?;
    backend.set(key, &bytes)
}

/// Load a JSON value stored under `key`
pub fn get_json<T: DeserializeOwned>(backend: &dyn StorageBackend, key: &str) -> Result<Option<T>> {
    backend
        .get(key)?
        .map(|bytes| serde_json::from_slice(&bytes))
        .transpose()
        .map_err(|e| Error::Deserialization(format!("{}: {}", key, e)))
}

// ═══════════════════════════════════════════════════════════════════════════════
// IN-MEMORY
// ═══════════════════════════════════════════════════════════════════════════════

/// Process-local store; contents vanish with the process
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored keys in order
    pub fn keys(&self) -> Result<Vec<String>> {
        let entries = self.entries.read().map_err(|_| Error::Lock)?;
        Ok(entries.keys().cloned().collect())
    }
}

impl StorageBackend for InMemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let entries = self.entries.read().map_err(|_| Error::Lock)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.entries
            .write()
            .map_err(|_| Error::Lock)?
            .insert(key.to_owned(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let mut entries = self.entries.write().map_err(|_| Error::Lock)?;
        Ok(entries.remove(key).is_some())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// FILE STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// One file per key under a data directory.
///
/// File names are the hex-encoded key, so any key maps to a flat, portable
/// name. Writes go to a sibling `.tmp` file which is synced and renamed over
/// the target.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open (creating if needed) the store rooted at `dir`
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let root = dir.as_ref().to_path_buf();
        fs::create_dir_all(&root)
            .map_err(|e| Error::Storage(format!("cannot create {}: {}", root.display(), e)))?;
        Ok(Self { root })
    }

    /// Data directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", hex::encode(key)))
    }
}

impl StorageBackend for FileStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Storage(format!("cannot read {}: {}", path.display(), e))),
        }
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        let path = self.path_for(key);
        let staging = path.with_extension("tmp");

        let write = |staging: &Path| -> std::io::Result<()> {
            let mut file = fs::File::create(staging)?;
            file.write_all(value)?;
            file.sync_all()
        };
        write(&staging)
            .map_err(|e| Error::Storage(format!("cannot write {}: {}", staging.display(), e)))?;

        fs::rename(&staging, &path)
            .map_err(|e| Error::Storage(format!("cannot replace {}: {}", path.display(), e)))
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::Storage(format!("cannot delete {}: {}", path.display(), e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Feed {
        id: String,
        weight: u64,
    }

    #[test]
    fn test_memory_store_basic_ops() {
        let store = InMemoryStore::new();
        assert!(!store.exists("oracle/snapshot").unwrap());

        store.set("oracle/snapshot", b"v1").unwrap();
        store.set("oracle/snapshot", b"v2").unwrap();
        assert_eq!(store.get("oracle/snapshot").unwrap(), Some(b"v2".to_vec()));
        assert_eq!(store.keys().unwrap(), vec!["oracle/snapshot".to_string()]);

        assert!(store.delete("oracle/snapshot").unwrap());
        assert!(!store.delete("oracle/snapshot").unwrap());
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = TempDir::new().unwrap();
        FileStore::new(dir.path())
            .unwrap()
            .set("oracle/snapshot", b"{}")
            .unwrap();

        let store = FileStore::new(dir.path()).unwrap();
        assert_eq!(store.get("oracle/snapshot").unwrap(), Some(b"{}".to_vec()));
        assert!(store.get("other").unwrap().is_none());
        assert!(store.delete("oracle/snapshot").unwrap());
        assert!(!store.delete("oracle/snapshot").unwrap());
    }

    #[test]
    fn test_file_store_leaves_no_staging_file() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path().join("nested")).unwrap();
        store.set("k", b"value").unwrap();

        let names: Vec<_> = fs::read_dir(store.root())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec![format!("{}.json", hex::encode("k"))]);
    }

    #[test]
    fn test_json_helpers() {
        let store = InMemoryStore::new();
        let feed = Feed { id: "pyth".into(), weight: 4_000 };

        put_json(&store, "feed", &feed).unwrap();
        assert_eq!(get_json::<Feed>(&store, "feed").unwrap(), Some(feed));
        assert_eq!(get_json::<Feed>(&store, "missing").unwrap(), None);

        store.set("bad", b"not json").unwrap();
        assert!(matches!(
            get_json::<Feed>(&store, "bad"),
            Err(Error::Deserialization(_))
        ));
    }
}
