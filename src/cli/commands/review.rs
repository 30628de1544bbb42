//! `specforge review prepare` and `specforge review submit`

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;

use super::common::{build_pipeline, open_store, read_input};
use crate::{ArtifactStore, ArtifactStoreExt, Config, ExitCode, keys, prepare_bundle};
use specforge_utils::component_id::sanitize_component_id;
use specforge_utils::error::SpecforgeError;
use specforge_utils::types::{Component, ComponentStatus, RunMode};

pub fn execute_review_prepare_command(id: &str, config: &Config) -> Result<ExitCode> {
    let id = sanitize_component_id(id).map_err(SpecforgeError::from)?;
    let store = open_store(config)?;
    let component: Component = store.get_json(&keys::status(&id)).map_err(SpecforgeError::from)?;

    let bundle = prepare_bundle(&*store, &component)?;

    println!("Review bundle for '{id}' ({}):", component.status);
    for file in &bundle.files {
        println!("  {}", store.path_for(file)?);
    }
    if !component.status.is_settled() {
        println!("Note: '{id}' is still being processed; submitting will be refused until it settles.");
    }
    Ok(ExitCode::SUCCESS)
}

pub async fn execute_review_submit_command(
    id: &str,
    file: &Path,
    config: &Config,
) -> Result<ExitCode> {
    let id = sanitize_component_id(id).map_err(SpecforgeError::from)?;
    let edited = read_input(file)?;
    let store = open_store(config)?;
    let pipeline = build_pipeline(
        config,
        Arc::clone(&store) as Arc<dyn ArtifactStore>,
        RunMode::Auto,
        &id,
    )?;

    let component = pipeline.review_manager().process_feedback(&id, &edited).await?;
    println!(
        "'{id}' is now {} after human revision {}",
        component.status, component.human_revision_count
    );

    Ok(match component.status {
        ComponentStatus::Ready => ExitCode::SUCCESS,
        _ => ExitCode::NEEDS_REVIEW,
    })
}
