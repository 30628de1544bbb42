use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::io::ErrorKind;

use specforge_utils::atomic_write::write_file_atomic;
use specforge_utils::error::StoreError;
use specforge_utils::paths::{ensure_dir_all, validate_key};

use crate::ArtifactStore;

/// Artifact store rooted at a directory on disk.
///
/// Keys map to relative paths under the root; writes go through
/// [`write_file_atomic`] (temp file, fsync, rename).
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: Utf8PathBuf,
}

impl FsArtifactStore {
    /// Open (and create if needed) a store at `root`.
    pub fn open(root: impl Into<Utf8PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        ensure_dir_all(&root).map_err(|e| StoreError::Write {
            key: root.to_string(),
            reason: format!("cannot create store root: {e}"),
        })?;
        Ok(Self { root })
    }

    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Absolute location of a key, for handing paths to humans.
    pub fn path_for(&self, key: &str) -> Result<Utf8PathBuf, StoreError> {
        Ok(self.root.join(validate_key(key)?))
    }

    fn collect(&self, dir: &Utf8Path, out: &mut Vec<String>) -> Result<(), StoreError> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(source) => {
                return Err(StoreError::Read {
                    key: dir.to_string(),
                    source,
                });
            }
        };

        for entry in entries {
            let entry = entry.map_err(|source| StoreError::Read {
                key: dir.to_string(),
                source,
            })?;
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let path = dir.join(&name);
            let file_type = entry.file_type().map_err(|source| StoreError::Read {
                key: path.to_string(),
                source,
            })?;
            if file_type.is_dir() {
                self.collect(&path, out)?;
            } else if file_type.is_file()
                && let Ok(rel) = path.strip_prefix(&self.root)
            {
                // Skip temp files left by an interrupted write.
                if !name.starts_with(".tmp") {
                    out.push(rel.as_str().replace('\\', "/"));
                }
            }
        }
        Ok(())
    }
}

impl ArtifactStore for FsArtifactStore {
    fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.path_for(key)?.is_file())
    }

    fn get(&self, key: &str) -> Result<String, StoreError> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound {
                key: key.to_string(),
            }),
            Err(source) => Err(StoreError::Read {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn put(&self, key: &str, content: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        let result = write_file_atomic(&path, content).map_err(|e| StoreError::Write {
            key: key.to_string(),
            reason: format!("{e:#}"),
        })?;
        for warning in result.warnings {
            tracing::warn!(artifact = %key, "{warning}");
        }
        tracing::debug!(artifact = %key, bytes = result.bytes_written, "Artifact written");
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let start = if prefix.is_empty() {
            self.root.clone()
        } else {
            self.path_for(prefix.trim_end_matches('/'))?
        };
        let mut keys = Vec::new();
        if start.is_file() {
            keys.push(prefix.to_string());
        } else {
            self.collect(&start, &mut keys)?;
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ArtifactStoreExt;
    use tempfile::TempDir;

    fn store() -> (FsArtifactStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        (FsArtifactStore::open(root).unwrap(), dir)
    }

    #[test]
    fn put_then_get() {
        let (store, _dir) = store();
        assert!(!store.exists("components/a/spec/r0.md").unwrap());

        store.put("components/a/spec/r0.md", "# A\n").unwrap();

        assert!(store.exists("components/a/spec/r0.md").unwrap());
        assert_eq!(store.get("components/a/spec/r0.md").unwrap(), "# A\n");
    }

    #[test]
    fn missing_key_is_not_found() {
        let (store, _dir) = store();
        let err = store.get("manifest.json").unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(store.get_opt("manifest.json").unwrap(), None);
    }

    #[test]
    fn rejects_traversal_keys() {
        let (store, _dir) = store();
        assert!(matches!(
            store.put("../escape.md", "x"),
            Err(StoreError::InvalidKey { .. })
        ));
    }

    #[test]
    fn list_is_recursive_and_sorted() {
        let (store, _dir) = store();
        store.put("status/b.json", "{}").unwrap();
        store.put("status/a.json", "{}").unwrap();
        store.put("components/a/spec/r0.md", "x").unwrap();

        assert_eq!(
            store.list("status").unwrap(),
            vec!["status/a.json".to_string(), "status/b.json".to_string()]
        );
        assert_eq!(store.list("").unwrap().len(), 3);
        assert!(store.list("review").unwrap().is_empty());
    }

    #[test]
    fn json_round_trip_is_canonical() {
        let (store, _dir) = store();
        let value = serde_json::json!({"z": 1, "a": 2});
        store.put_json("x.json", &value).unwrap();
        assert_eq!(store.get("x.json").unwrap(), r#"{"a":2,"z":1}"#);
        let back: serde_json::Value = store.get_json("x.json").unwrap();
        assert_eq!(back, value);
    }
}
