//! Artifact persistence for specforge.
//!
//! Every intermediate result of a run (analysis decisions, child
//! specifications, questions, answers, evaluations, status records) is an
//! artifact addressed by a deterministic key. Steps check [`ArtifactStore::exists`]
//! before generating, which is what makes an interrupted run resumable.

mod fs_store;
pub mod keys;
mod memory;

pub use fs_store::FsArtifactStore;
pub use keys::{Revision, Step};
pub use memory::MemoryArtifactStore;

use serde::Serialize;
use serde::de::DeserializeOwned;
use specforge_utils::canonicalization::emit_jcs;
use specforge_utils::error::StoreError;

/// Path-addressed artifact storage.
///
/// `put` is atomic per key: readers see the previous content or the complete
/// new content. Writes for different components touch disjoint keys, so
/// implementations only need per-key consistency.
pub trait ArtifactStore: Send + Sync {
    fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Read an artifact; [`StoreError::NotFound`] when absent.
    fn get(&self, key: &str) -> Result<String, StoreError>;

    fn put(&self, key: &str, content: &str) -> Result<(), StoreError>;

    /// Keys under `prefix`, sorted.
    fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

/// Typed helpers layered over any [`ArtifactStore`].
pub trait ArtifactStoreExt: ArtifactStore {
    /// Read an artifact, mapping absence to `None`.
    fn get_opt(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self.get(key) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<T, StoreError> {
        let raw = self.get(key)?;
        serde_json::from_str(&raw).map_err(|e| StoreError::Decode {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }

    fn get_json_opt<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        match self.get_json(key) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Write a value as canonical JSON.
    fn put_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let json = emit_jcs(value).map_err(|e| StoreError::Write {
            key: key.to_string(),
            reason: format!("{e:#}"),
        })?;
        self.put(key, &json)
    }
}

impl<S: ArtifactStore + ?Sized> ArtifactStoreExt for S {}
