//! Persisted run-level records: the manifest, the run summary and the status
//! report read back by `specforge status`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use specforge_store::{ArtifactStore, ArtifactStoreExt, keys};
use specforge_utils::error::{SpecforgeError, StoreError};
use specforge_utils::exit_codes::ExitCode;
use specforge_utils::types::{Component, ComponentId, ComponentStatus, ErrorKind, RunMode};
use std::fmt::Write as _;

use crate::deps::PrunedEdge;
use crate::pipeline::Stage;

/// Flat list of leaf components produced by decomposition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub root: ComponentId,
    pub max_depth: usize,
    pub max_depth_reached: usize,
    pub components: Vec<ManifestEntry>,
    /// Branches whose decomposition failed; their leaves are missing
    #[serde(default)]
    pub failed_branches: Vec<ComponentId>,
}

impl Manifest {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed_branches.is_empty()
    }

    #[must_use]
    pub fn ids(&self) -> Vec<&str> {
        self.components
            .iter()
            .map(|entry| entry.component_id.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub component_id: ComponentId,
    pub name: String,
    /// Key of the specification the component was decomposed into
    pub spec_reference: String,
    pub depth: usize,
    pub parent: Option<ComponentId>,
}

/// A component or branch that failed, with the responsible error kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub component_id: ComponentId,
    pub kind: ErrorKind,
    pub message: String,
}

impl Failure {
    #[must_use]
    pub fn new(component_id: impl Into<ComponentId>, error: &SpecforgeError) -> Self {
        Self {
            component_id: component_id.into(),
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Ready,
    NeedsHumanReview,
    Failed,
    /// Not processed yet (step-through run halted earlier)
    Pending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentOutcome {
    pub component_id: ComponentId,
    pub name: String,
    pub status: ComponentStatus,
    pub outcome: Outcome,
    pub revision_count: u32,
    pub human_revision_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ComponentOutcome {
    #[must_use]
    pub fn from_component(component: &Component) -> Self {
        let outcome = match component.status {
            ComponentStatus::Ready => Outcome::Ready,
            ComponentStatus::NeedsHumanReview => Outcome::NeedsHumanReview,
            _ => Outcome::Pending,
        };
        Self {
            component_id: component.component_id.clone(),
            name: component.name.clone(),
            status: component.status,
            outcome,
            revision_count: component.revision_count,
            human_revision_count: component.human_revision_count,
            error_kind: None,
            error: None,
        }
    }

    #[must_use]
    pub fn failed(component: &Component, failure: &Failure) -> Self {
        Self {
            outcome: Outcome::Failed,
            error_kind: Some(failure.kind),
            error: Some(failure.message.clone()),
            ..Self::from_component(component)
        }
    }
}

/// Machine-readable result of one `run`, written to `summary.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_mode: RunMode,
    /// Set when a step-through run stopped after this stage
    pub halted_after: Option<Stage>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub root: ComponentId,
    pub max_depth_reached: usize,
    pub components: Vec<ComponentOutcome>,
    pub decomposition_failures: Vec<Failure>,
    pub generation_order: Vec<ComponentId>,
    pub cycles: Vec<Vec<ComponentId>>,
    pub pruned_edges: Vec<PrunedEdge>,
}

impl RunSummary {
    #[must_use]
    pub fn count(&self, outcome: Outcome) -> usize {
        self.components
            .iter()
            .filter(|c| c.outcome == outcome)
            .count()
    }

    fn failure_kinds(&self) -> impl Iterator<Item = ErrorKind> + '_ {
        self.components
            .iter()
            .filter_map(|c| c.error_kind)
            .chain(self.decomposition_failures.iter().map(|f| f.kind))
    }

    /// Exit status: failures first (generation, then configuration, then
    /// anything else), then components awaiting review.
    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        let kinds: Vec<ErrorKind> = self.failure_kinds().collect();
        if kinds.contains(&ErrorKind::GenerationFailure) {
            ExitCode::GENERATION_FAILURE
        } else if kinds.contains(&ErrorKind::ConfigError) {
            ExitCode::CLI_ARGS
        } else if !kinds.is_empty() {
            ExitCode::INTERNAL
        } else if self.count(Outcome::NeedsHumanReview) > 0 {
            ExitCode::NEEDS_REVIEW
        } else {
            ExitCode::SUCCESS
        }
    }

    #[must_use]
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Run of '{}' ({}): {} ready, {} need review, {} failed, {} pending",
            self.root,
            self.run_mode.as_str(),
            self.count(Outcome::Ready),
            self.count(Outcome::NeedsHumanReview),
            self.count(Outcome::Failed),
            self.count(Outcome::Pending),
        );
        if let Some(stage) = self.halted_after {
            let _ = writeln!(out, "Stopped after the {stage} stage; run again to continue.");
        }
        for component in &self.components {
            let _ = write!(
                out,
                "  {:<24} {:<20} revisions: {}",
                component.component_id,
                component.status.as_str(),
                component.revision_count
            );
            if component.human_revision_count > 0 {
                let _ = write!(out, " (+{} human)", component.human_revision_count);
            }
            if let Some(error) = &component.error {
                let _ = write!(out, "  error: {error}");
            }
            out.push('\n');
        }
        for failure in &self.decomposition_failures {
            let _ = writeln!(
                out,
                "  decomposition of '{}' failed: {}",
                failure.component_id, failure.message
            );
        }
        if !self.generation_order.is_empty() {
            let _ = writeln!(out, "Generation order: {}", self.generation_order.join(" -> "));
        }
        for cycle in &self.cycles {
            let _ = writeln!(out, "Dependency cycle broken: {}", cycle.join(" -> "));
        }
        out
    }
}

/// Persisted state of an output directory, read without running anything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub manifest: Option<Manifest>,
    pub components: Vec<Component>,
    pub generation_order: Option<Vec<ComponentId>>,
}

impl StatusReport {
    pub fn load(store: &dyn ArtifactStore) -> Result<Self, StoreError> {
        let manifest: Option<Manifest> = store.get_json_opt(keys::MANIFEST)?;
        let mut components = Vec::new();
        for key in store.list("status")? {
            components.push(store.get_json::<Component>(&key)?);
        }
        // Manifest order when there is one, otherwise sorted by key.
        if let Some(manifest) = &manifest {
            let position = |id: &str| {
                manifest
                    .components
                    .iter()
                    .position(|e| e.component_id == id)
                    .unwrap_or(usize::MAX)
            };
            components.sort_by_key(|c| position(&c.component_id));
        }
        let generation_order = store.get_json_opt(keys::GENERATION_ORDER)?;
        Ok(Self {
            manifest,
            components,
            generation_order,
        })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.manifest.is_none() && self.components.is_empty()
    }

    #[must_use]
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        match &self.manifest {
            Some(manifest) => {
                let _ = writeln!(
                    out,
                    "Manifest: {} components from '{}' (depth {} of {})",
                    manifest.components.len(),
                    manifest.root,
                    manifest.max_depth_reached,
                    manifest.max_depth
                );
            }
            None => out.push_str("No manifest yet.\n"),
        }
        for c in &self.components {
            let _ = writeln!(
                out,
                "  {:<24} {:<20} revisions: {}  spec: {}",
                c.component_id,
                c.status.as_str(),
                c.revision_count,
                c.spec_reference
            );
        }
        if let Some(order) = &self.generation_order {
            let _ = writeln!(out, "Generation order: {}", order.join(" -> "));
        }
        out
    }
}
