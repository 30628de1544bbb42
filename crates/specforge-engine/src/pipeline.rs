//! Run-level orchestration: decompose, process, order.
//!
//! Every stage is safe to repeat: artifacts that exist are loaded instead of
//! regenerated, so a second run over a finished output directory makes no
//! generator calls. In step-through mode a run stops after the first stage
//! that changed anything; the next invocation picks up from the artifacts.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use specforge_store::{ArtifactStore, ArtifactStoreExt, keys};
use specforge_utils::canonicalization::content_hash;
use specforge_utils::error::SpecforgeError;
use specforge_utils::logging::stage_span;
use specforge_utils::types::{Component, ComponentId, ComponentStatus, RunMode, Specification};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::{Instrument, info, warn};

use crate::batch::BatchRunner;
use crate::decomposer::{Decomposer, Decomposition};
use crate::deps::{DependencyAnalyzer, DependencyGraph, topo_order};
use crate::generation::{Generator, GuidanceDocument};
use crate::processor::ComponentProcessor;
use crate::review::ReviewManager;
use crate::run_config::RunConfig;
use crate::sink::{GenerationSink, ManifestSink};
use crate::summary::{ComponentOutcome, Failure, Manifest, RunSummary, StatusReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Decompose,
    Process,
    Order,
}

impl Stage {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Decompose => "decompose",
            Self::Process => "process",
            Self::Order => "order",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dependency graph and generation order of the ready components.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ordering {
    pub graph: DependencyGraph,
    pub order: Vec<ComponentId>,
}

/// Result of the processing stage, in manifest order.
struct Processed {
    components: Vec<Component>,
    failures: HashMap<ComponentId, Failure>,
    progressed: bool,
}

pub struct Pipeline {
    store: Arc<dyn ArtifactStore>,
    generator: Arc<dyn Generator>,
    config: Arc<RunConfig>,
    guidance: Arc<[GuidanceDocument]>,
    sink: Arc<dyn GenerationSink>,
}

impl Pipeline {
    #[must_use]
    pub fn new(store: Arc<dyn ArtifactStore>, generator: Arc<dyn Generator>, config: RunConfig) -> Self {
        Self {
            sink: Arc::new(ManifestSink::new(Arc::clone(&store))),
            store,
            generator,
            config: Arc::new(config),
            guidance: Arc::from(Vec::new()),
        }
    }

    #[must_use]
    pub fn with_guidance(mut self, guidance: Vec<GuidanceDocument>) -> Self {
        self.guidance = Arc::from(guidance);
        self
    }

    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn GenerationSink>) -> Self {
        self.sink = sink;
        self
    }

    #[must_use]
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    #[must_use]
    pub fn decomposer(&self) -> Decomposer {
        Decomposer::new(
            Arc::clone(&self.store),
            Arc::clone(&self.generator),
            Arc::clone(&self.guidance),
            Arc::clone(&self.config),
        )
    }

    #[must_use]
    pub fn processor(&self) -> ComponentProcessor {
        ComponentProcessor::new(
            Arc::clone(&self.store),
            Arc::clone(&self.generator),
            Arc::clone(&self.guidance),
            Arc::clone(&self.config),
        )
    }

    #[must_use]
    pub fn review_manager(&self) -> ReviewManager {
        ReviewManager::new(Arc::clone(&self.store), self.processor())
    }

    /// Run the stages for `input` and write `summary.json`.
    ///
    /// `input.id` must already be a sanitized component ID. Failures of
    /// individual components or branches are collected into the summary;
    /// only root-level, store and fail-fast errors are returned.
    pub async fn run(&self, input: &Specification) -> Result<RunSummary, SpecforgeError> {
        let started_at = Utc::now();
        let step_through = self.config.run_mode == RunMode::StepThrough;
        let root = self.seed_root(input)?;
        info!(
            root = %root.id,
            mode = self.config.run_mode.as_str(),
            max_depth = self.config.max_depth,
            max_revisions = self.config.max_revisions,
            "Starting run"
        );

        let previous_manifest: Option<Manifest> = self.store.get_json_opt(keys::MANIFEST)?;
        let name = title_of(&root.content).unwrap_or_else(|| root.id.clone());
        let decomposition = self
            .decomposer()
            .decompose(root.clone(), name)
            .instrument(stage_span(Stage::Decompose.as_str()))
            .await?;
        let manifest = decomposition.manifest(self.config.max_depth);
        self.store.put_json(keys::MANIFEST, &manifest)?;

        if step_through && previous_manifest.as_ref() != Some(&manifest) {
            return self.finish(started_at, Some(Stage::Decompose), &decomposition, None, None);
        }

        let processed = self
            .process_stage(&decomposition)
            .instrument(stage_span(Stage::Process.as_str()))
            .await?;

        if step_through && processed.progressed {
            return self.finish(
                started_at,
                Some(Stage::Process),
                &decomposition,
                Some(&processed),
                None,
            );
        }

        let ordering = order_components(&self.store, self.sink.as_ref(), &processed.components)
            .instrument(stage_span(Stage::Order.as_str()))
            .await?;

        self.finish(
            started_at,
            None,
            &decomposition,
            Some(&processed),
            Some(&ordering),
        )
    }

    /// Store the root specification under its own key.
    ///
    /// A root that already exists is kept: its decomposition is on disk and
    /// belongs to that content.
    fn seed_root(&self, input: &Specification) -> Result<Specification, SpecforgeError> {
        let location = keys::initial_spec(&input.id);
        let content = match self.store.get_opt(&location)? {
            Some(existing) => {
                if content_hash(&existing) != content_hash(&input.content) {
                    warn!(
                        root = %input.id,
                        input = %input.location,
                        "Input specification changed since the first run; reusing the persisted one (use --fresh to start over)"
                    );
                }
                existing
            }
            None => {
                self.store.put(&location, &input.content)?;
                self.store.get(&location)?
            }
        };
        Ok(Specification {
            id: input.id.clone(),
            location,
            content,
        })
    }

    async fn process_stage(&self, decomposition: &Decomposition) -> Result<Processed, SpecforgeError> {
        let pending: Vec<Component> = decomposition
            .components
            .iter()
            .filter(|c| !c.status.is_settled())
            .cloned()
            .collect();
        info!(
            components = decomposition.components.len(),
            pending = pending.len(),
            "Processing components"
        );

        let processor = self.processor();
        let results = BatchRunner::new(self.config.batch)
            .run(pending.clone(), move |component| {
                let processor = processor.clone();
                async move { processor.process(component).await }
            })
            .await?;

        let mut updated: HashMap<ComponentId, Component> = HashMap::new();
        let mut failures = HashMap::new();
        let mut progressed = false;
        for (before, result) in pending.into_iter().zip(results) {
            let after = match result {
                Ok(component) => component,
                Err(e) => {
                    failures.insert(
                        before.component_id.clone(),
                        Failure::new(before.component_id.clone(), &e),
                    );
                    self.store
                        .get_json_opt::<Component>(&keys::status(&before.component_id))?
                        .unwrap_or_else(|| before.clone())
                }
            };
            progressed |= after != before;
            updated.insert(after.component_id.clone(), after);
        }

        let components: Vec<Component> = decomposition
            .components
            .iter()
            .map(|c| updated.remove(&c.component_id).unwrap_or_else(|| c.clone()))
            .collect();

        let reviews = self.review_manager();
        for component in components
            .iter()
            .filter(|c| c.status == ComponentStatus::NeedsHumanReview)
        {
            reviews.prepare_for_review(component)?;
        }

        Ok(Processed {
            components,
            failures,
            progressed,
        })
    }

    fn finish(
        &self,
        started_at: chrono::DateTime<Utc>,
        halted_after: Option<Stage>,
        decomposition: &Decomposition,
        processed: Option<&Processed>,
        ordering: Option<&Ordering>,
    ) -> Result<RunSummary, SpecforgeError> {
        let components = processed.map_or(&decomposition.components, |p| &p.components);
        let outcomes = components
            .iter()
            .map(|c| {
                match processed.and_then(|p| p.failures.get(&c.component_id)) {
                    Some(failure) => ComponentOutcome::failed(c, failure),
                    None => ComponentOutcome::from_component(c),
                }
            })
            .collect();

        let summary = RunSummary {
            run_mode: self.config.run_mode,
            halted_after,
            started_at,
            finished_at: Utc::now(),
            root: decomposition.root.clone(),
            max_depth_reached: decomposition.max_depth_reached,
            components: outcomes,
            decomposition_failures: decomposition.failures.clone(),
            generation_order: ordering.map(|o| o.order.clone()).unwrap_or_default(),
            cycles: ordering.map(|o| o.graph.cycles.clone()).unwrap_or_default(),
            pruned_edges: ordering.map(|o| o.graph.pruned.clone()).unwrap_or_default(),
        };
        self.store.put_json(keys::SUMMARY, &summary)?;

        if let Some(stage) = halted_after {
            info!(stage = %stage, "Step-through run paused");
        } else {
            info!(exit_code = summary.exit_code().as_i32(), "Run complete");
        }
        Ok(summary)
    }
}

/// Build the dependency graph of the ready components, persist it with the
/// generation order, and hand the ordered components to `sink`.
///
/// Each ready component's status record is updated with its dependencies.
pub async fn order_components(
    store: &Arc<dyn ArtifactStore>,
    sink: &dyn GenerationSink,
    components: &[Component],
) -> Result<Ordering, SpecforgeError> {
    let mut graph = DependencyAnalyzer::new(Arc::clone(store)).build_graph(components)?;
    let topo = topo_order(&graph.edges);
    graph.cycles = topo.cycles;

    let mut by_id: BTreeMap<ComponentId, Component> = BTreeMap::new();
    for component in components {
        let Some(deps) = graph.edges.get(&component.component_id) else {
            continue;
        };
        let mut component = component.clone();
        if &component.dependencies != deps {
            component.dependencies = deps.clone();
            store.put_json(&keys::status(&component.component_id), &component)?;
        }
        by_id.insert(component.component_id.clone(), component);
    }

    store.put_json(keys::DEPENDENCIES, &graph)?;
    store.put_json(keys::GENERATION_ORDER, &topo.order)?;

    let ordered: Vec<Component> = topo
        .order
        .iter()
        .filter_map(|id| by_id.remove(id))
        .collect();
    sink.accept(&ordered).await?;

    info!(
        ready = ordered.len(),
        cycles = graph.cycles.len(),
        pruned = graph.pruned.len(),
        "Generation order computed"
    );
    Ok(Ordering {
        graph,
        order: topo.order,
    })
}

/// Recompute the order from the persisted status records alone.
pub async fn order_from_store(
    store: &Arc<dyn ArtifactStore>,
    sink: &dyn GenerationSink,
) -> Result<Ordering, SpecforgeError> {
    let report = StatusReport::load(store.as_ref())?;
    order_components(store, sink, &report.components).await
}

/// Text of the first level-one heading.
fn title_of(content: &str) -> Option<String> {
    content
        .lines()
        .find_map(|line| line.strip_prefix("# "))
        .map(|title| title.trim().to_string())
        .filter(|title| !title.is_empty())
}
