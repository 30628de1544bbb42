//! Helpers shared by command handlers.

use anyhow::{Context, Result};
use camino::Utf8Path;
use serde::Serialize;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

use crate::{
    ArtifactStore, Config, FsArtifactStore, Generator, GuidanceDocument, LlmGenerator, Pipeline,
    RunConfig, SpecforgeError, emit_jcs, keys,
};
use specforge_utils::types::RunMode;

/// Top-level entries of an output directory that a run owns.
const RUN_ENTRIES: &[&str] = &[
    "components",
    "decomposition",
    "status",
    "review",
    keys::MANIFEST,
    keys::DEPENDENCIES,
    keys::GENERATION_ORDER,
    keys::SUMMARY,
    keys::HANDOFF,
];

pub(super) fn open_store(config: &Config) -> Result<Arc<FsArtifactStore>> {
    let dir = config.output_dir();
    let store = FsArtifactStore::open(dir.as_str())
        .with_context(|| format!("Failed to open output directory: {dir}"))?;
    Ok(Arc::new(store))
}

/// Remove everything a previous run wrote under `root`. Other files are kept.
pub(super) fn clear_run_artifacts(root: &Utf8Path) -> Result<()> {
    for entry in RUN_ENTRIES {
        let path = root.join(entry);
        let removed = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        match removed {
            Ok(()) => tracing::debug!(path = %path, "Removed previous run artifact"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e).with_context(|| format!("Failed to remove {path}")),
        }
    }
    Ok(())
}

/// Read a file the user pointed at; a missing file is an input error.
pub(super) fn read_input(path: &Path) -> Result<String> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(SpecforgeError::InputMissing {
            location: path.display().to_string(),
        }
        .into()),
        Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
    }
}

pub(super) fn load_guidance(config: &Config) -> Result<Vec<GuidanceDocument>> {
    config
        .guidance
        .documents
        .iter()
        .map(|location| {
            let path = Path::new(location);
            Ok(GuidanceDocument {
                name: path
                    .file_name()
                    .map_or_else(|| location.clone(), |n| n.to_string_lossy().into_owned()),
                content: read_input(path)?,
            })
        })
        .collect()
}

/// Generator over the configured LLM backend.
pub(super) fn build_generator(config: &Config, subject: &str) -> Result<Arc<dyn Generator>> {
    let backend = specforge_llm::from_config(config)
        .map_err(|e| SpecforgeError::generation(subject, "setup", e))?;
    Ok(Arc::new(LlmGenerator::new(
        Arc::from(backend),
        config.model(),
        config.generation_timeout(),
    )))
}

pub(super) fn build_pipeline(
    config: &Config,
    store: Arc<dyn ArtifactStore>,
    run_mode: RunMode,
    subject: &str,
) -> Result<Pipeline> {
    let generator = build_generator(config, subject)?;
    Ok(
        Pipeline::new(store, generator, RunConfig::from_config(config, run_mode))
            .with_guidance(load_guidance(config)?),
    )
}

pub(super) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", emit_jcs(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use tempfile::TempDir;

    #[test]
    fn clearing_keeps_unrelated_files() {
        let temp = TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        fs::create_dir_all(root.join("components/db/spec")).unwrap();
        fs::write(root.join("components/db/spec/r0.md"), "# db").unwrap();
        fs::write(root.join("manifest.json"), "{}").unwrap();
        fs::write(root.join("notes.txt"), "keep me").unwrap();

        clear_run_artifacts(&root).unwrap();

        assert!(!root.join("components").exists());
        assert!(!root.join("manifest.json").exists());
        assert!(root.join("notes.txt").exists());
    }

    #[test]
    fn missing_input_is_an_input_error() {
        let err = read_input(Path::new("/nonexistent/specforge/input.md")).unwrap_err();
        let specforge_error = err.downcast_ref::<SpecforgeError>().unwrap();
        assert!(matches!(specforge_error, SpecforgeError::InputMissing { .. }));
    }
}
