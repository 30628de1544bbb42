//! `specforge run`

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use super::common::{build_pipeline, clear_run_artifacts, open_store, print_json, read_input};
use crate::{ArtifactStore, Config, ExitCode};
use specforge_utils::component_id::sanitize_component_id;
use specforge_utils::error::SpecforgeError;
use specforge_utils::types::{RunMode, Specification};

pub async fn execute_run_command(
    spec_path: &Path,
    fresh: bool,
    step_through: bool,
    json: bool,
    config: &Config,
) -> Result<ExitCode> {
    let content = read_input(spec_path)?;
    let stem = spec_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let root_id = sanitize_component_id(&stem).map_err(SpecforgeError::from)?;

    let store = open_store(config)?;
    if fresh {
        info!(out = %store.root(), "Discarding previous run artifacts");
        clear_run_artifacts(store.root())?;
    }

    let run_mode = if step_through {
        RunMode::StepThrough
    } else {
        RunMode::Auto
    };
    let pipeline = build_pipeline(
        config,
        Arc::clone(&store) as Arc<dyn ArtifactStore>,
        run_mode,
        &root_id,
    )?;

    let summary = pipeline
        .run(&Specification {
            id: root_id,
            location: spec_path.display().to_string(),
            content,
        })
        .await?;

    if json {
        print_json(&summary)?;
    } else {
        print!("{}", summary.render_text());
        println!("Artifacts: {}", store.root());
    }
    Ok(summary.exit_code())
}
