use std::collections::BTreeMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};

use specforge_utils::error::StoreError;
use specforge_utils::paths::validate_key;

use crate::ArtifactStore;

/// In-memory artifact store, used in tests and dry runs.
///
/// Counts writes so tests can assert that a resumed run produced nothing new.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    entries: RwLock<BTreeMap<String, String>>,
    writes: AtomicUsize,
}

impl MemoryArtifactStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total `put` calls so far.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Snapshot of every key currently stored.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.entries
            .read()
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Remove a key, simulating an artifact lost between runs.
    pub fn remove(&self, key: &str) -> Option<String> {
        self.entries.write().ok()?.remove(key)
    }

    fn poisoned(key: &str) -> StoreError {
        StoreError::Write {
            key: key.to_string(),
            reason: "store lock poisoned".to_string(),
        }
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn exists(&self, key: &str) -> Result<bool, StoreError> {
        validate_key(key)?;
        let entries = self.entries.read().map_err(|_| Self::poisoned(key))?;
        Ok(entries.contains_key(key))
    }

    fn get(&self, key: &str) -> Result<String, StoreError> {
        validate_key(key)?;
        let entries = self.entries.read().map_err(|_| Self::poisoned(key))?;
        entries.get(key).cloned().ok_or_else(|| StoreError::NotFound {
            key: key.to_string(),
        })
    }

    fn put(&self, key: &str, content: &str) -> Result<(), StoreError> {
        validate_key(key)?;
        let normalized = content.replace("\r\n", "\n");
        let mut entries = self.entries.write().map_err(|_| Self::poisoned(key))?;
        entries.insert(key.to_string(), normalized);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let entries = self.entries.read().map_err(|_| Self::poisoned(prefix))?;
        let dir_prefix = if prefix.is_empty() || prefix.ends_with('/') {
            prefix.to_string()
        } else {
            format!("{prefix}/")
        };
        Ok(entries
            .keys()
            .filter(|k| k.as_str() == prefix || k.starts_with(&dir_prefix))
            .cloned()
            .collect())
    }
}
