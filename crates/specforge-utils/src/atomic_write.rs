//! Atomic artifact writes.
//!
//! Every artifact the pipeline produces goes through [`write_file_atomic`]:
//! content lands in a temporary file beside the target, is fsynced, then
//! renamed over the target. A reader therefore observes either the previous
//! content or the complete new content, never a torn write. When the rename
//! crosses a filesystem boundary the write falls back to copy, fsync, rename
//! inside the target directory.

use anyhow::{Context, Result};
use camino::Utf8Path;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Outcome of an atomic write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AtomicWriteResult {
    /// Bytes persisted after line-ending normalization
    pub bytes_written: usize,
    /// Whether the copy fallback was needed because the rename crossed devices
    pub used_cross_filesystem_fallback: bool,
    pub warnings: Vec<String>,
}

/// Atomically write `content` to `path`, creating parent directories.
///
/// Line endings are normalized to LF so artifacts hash identically across
/// platforms.
pub fn write_file_atomic(path: &Utf8Path, content: &str) -> Result<AtomicWriteResult> {
    let normalized = normalize_line_endings(content);
    let mut result = AtomicWriteResult {
        bytes_written: normalized.len(),
        ..AtomicWriteResult::default()
    };

    let parent = path.parent().unwrap_or_else(|| Utf8Path::new("."));
    let parent = if parent.as_str().is_empty() {
        Utf8Path::new(".")
    } else {
        parent
    };
    fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create parent directory: {parent}"))?;

    let mut temp_file = NamedTempFile::new_in(parent)
        .with_context(|| format!("Failed to create temporary file in: {parent}"))?;
    temp_file
        .write_all(normalized.as_bytes())
        .with_context(|| format!("Failed to write temporary file for {path}"))?;
    temp_file
        .as_file()
        .sync_all()
        .with_context(|| format!("Failed to fsync temporary file for {path}"))?;

    let temp_path = temp_file.path().to_path_buf();
    match temp_file.persist(path.as_std_path()) {
        Ok(_) => {}
        Err(e) if is_cross_filesystem_error(&e.error) => {
            result.used_cross_filesystem_fallback = true;
            result
                .warnings
                .push("Used cross-filesystem fallback (copy, fsync, rename)".to_string());
            copy_then_replace(&temp_path, path)?;
        }
        Err(e) => {
            return Err(anyhow::Error::new(e.error))
                .with_context(|| format!("Failed to atomically write file: {path}"));
        }
    }

    Ok(result)
}

fn normalize_line_endings(content: &str) -> String {
    if !content.contains('\r') {
        return content.to_string();
    }
    content.replace("\r\n", "\n").replace('\r', "\n")
}

#[cfg(unix)]
fn is_cross_filesystem_error(err: &std::io::Error) -> bool {
    // EXDEV
    err.raw_os_error() == Some(18)
}

#[cfg(not(unix))]
fn is_cross_filesystem_error(_err: &std::io::Error) -> bool {
    false
}

fn copy_then_replace(temp_path: &Path, target: &Utf8Path) -> Result<()> {
    let bytes = fs::read(temp_path)
        .with_context(|| "Failed to read temporary file for cross-filesystem copy")?;

    let target_dir = target.parent().unwrap_or_else(|| Utf8Path::new("."));
    let mut staged = NamedTempFile::new_in(target_dir)
        .with_context(|| format!("Failed to stage copy in {target_dir}"))?;
    staged
        .write_all(&bytes)
        .with_context(|| "Failed to write staged copy")?;
    staged
        .as_file()
        .sync_all()
        .with_context(|| "Failed to fsync staged copy")?;
    staged
        .persist(target.as_std_path())
        .map_err(|e| anyhow::Error::new(e.error))
        .with_context(|| format!("Failed to persist staged copy to {target}"))?;

    let _ = fs::remove_file(temp_path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use tempfile::TempDir;

    fn utf8_dir(dir: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap()
    }

    #[test]
    fn normalizes_mixed_line_endings() {
        assert_eq!(normalize_line_endings("a\r\nb\rc\n"), "a\nb\nc\n");
        assert_eq!(normalize_line_endings("plain"), "plain");
    }

    #[test]
    fn writes_content_and_creates_parents() {
        let dir = TempDir::new().unwrap();
        let target = utf8_dir(&dir).join("components/auth/questions/r0.md");

        let result = write_file_atomic(&target, "# Questions\r\n1. Why?\r\n").unwrap();

        assert!(!result.used_cross_filesystem_fallback);
        assert!(result.warnings.is_empty());
        assert_eq!(
            fs::read_to_string(&target).unwrap(),
            "# Questions\n1. Why?\n"
        );
        assert_eq!(result.bytes_written, "# Questions\n1. Why?\n".len());
    }

    #[test]
    fn overwrite_replaces_whole_file() {
        let dir = TempDir::new().unwrap();
        let target = utf8_dir(&dir).join("status.json");

        write_file_atomic(&target, "a much longer first version").unwrap();
        write_file_atomic(&target, "short").unwrap();

        assert_eq!(fs::read_to_string(&target).unwrap(), "short");
    }

    #[test]
    fn leaves_no_temporary_files_behind() {
        let dir = TempDir::new().unwrap();
        let root = utf8_dir(&dir);
        write_file_atomic(&root.join("one.txt"), "1").unwrap();
        write_file_atomic(&root.join("two.txt"), "2").unwrap();

        let mut names: Vec<String> = fs::read_dir(&root)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["one.txt", "two.txt"]);
    }
}
