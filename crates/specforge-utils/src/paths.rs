use camino::{Utf8Component, Utf8Path};

use crate::error::StoreError;

/// Default output directory for a run when none is given.
pub const DEFAULT_OUTPUT_DIR: &str = ".specforge/out";

/// mkdir -p; treat `AlreadyExists` as success (removes TOCTTOU races)
pub fn ensure_dir_all<P: AsRef<std::path::Path>>(p: P) -> std::io::Result<()> {
    match std::fs::create_dir_all(&p) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(e),
    }
}

/// Validate an artifact key and return it as a relative path.
///
/// Keys are `/`-separated, relative, and may not contain `.` or `..`
/// segments, so a key can never resolve outside the store root.
pub fn validate_key(key: &str) -> Result<&Utf8Path, StoreError> {
    let invalid = |reason: &str| StoreError::InvalidKey {
        key: key.to_string(),
        reason: reason.to_string(),
    };

    if key.is_empty() {
        return Err(invalid("empty key"));
    }
    if key.contains('\\') {
        return Err(invalid("backslash separators are not allowed"));
    }

    let path = Utf8Path::new(key);
    for component in path.components() {
        match component {
            Utf8Component::Normal(_) => {}
            Utf8Component::ParentDir => return Err(invalid("parent traversal")),
            Utf8Component::CurDir => return Err(invalid("'.' segment")),
            Utf8Component::RootDir | Utf8Component::Prefix(_) => {
                return Err(invalid("absolute path"));
            }
        }
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_nested_relative_keys() {
        assert!(validate_key("components/auth/questions/r0.md").is_ok());
        assert!(validate_key("manifest.json").is_ok());
    }

    #[test]
    fn rejects_escaping_keys() {
        for key in ["", "../x", "a/../../b", "/etc/passwd", "./a", "a\\b"] {
            assert!(validate_key(key).is_err(), "{key} should be rejected");
        }
    }

    #[test]
    fn ensure_dir_all_is_idempotent() {
        let dir = tempfile::TempDir::new().unwrap();
        let nested = dir.path().join("a/b/c");
        ensure_dir_all(&nested).unwrap();
        ensure_dir_all(&nested).unwrap();
        assert!(nested.is_dir());
    }
}
