//! Bounded recursive decomposition
//!
//! A specification is analyzed; if it must be split, the generator writes one
//! child specification per recommended component and each child is analyzed
//! in turn, down to `max_depth`. Recursion is an explicit worklist: each node
//! is expanded to an [`Expansion`], and children are pushed back in reverse so
//! leaves come out in tree pre-order. Siblings of one split are expanded
//! concurrently through the [`BatchRunner`].

use serde::{Deserialize, Serialize};
use specforge_store::{ArtifactStore, ArtifactStoreExt, keys};
use specforge_utils::canonicalization::content_hash;
use specforge_utils::error::{ConfigError, GenerationError, SpecforgeError};
use specforge_utils::logging::{decompose_span, log_step_complete};
use specforge_utils::types::{
    AnalysisResult, Component, ComponentId, RecommendedComponent, Specification,
};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{Instrument, info, warn};

use crate::analyzer::Analyzer;
use crate::batch::BatchRunner;
use crate::generation::{GenerationRequest, Generator, GuidanceDocument, OutputShape, Task};
use crate::run_config::RunConfig;
use crate::summary::{Failure, Manifest, ManifestEntry};

/// Result of expanding one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expansion {
    Leaf,
    NeedsSplit(Vec<ChildSpec>),
}

/// A child specification produced by a split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildSpec {
    pub spec: Specification,
    pub name: String,
}

/// Record of a split, persisted next to the analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct SplitRecord {
    parent: ComponentId,
    children: Vec<RecommendedComponent>,
}

#[derive(Debug, Clone)]
pub struct Decomposition {
    pub root: ComponentId,
    /// Leaf manifest entries in tree pre-order
    pub entries: Vec<ManifestEntry>,
    /// Status records of the leaves, in the same order
    pub components: Vec<Component>,
    pub max_depth_reached: usize,
    /// Branches that failed; empty when decomposition is complete
    pub failures: Vec<Failure>,
}

impl Decomposition {
    #[must_use]
    pub fn manifest(&self, max_depth: usize) -> Manifest {
        Manifest {
            root: self.root.clone(),
            max_depth,
            max_depth_reached: self.max_depth_reached,
            components: self.entries.clone(),
            failed_branches: self.failures.iter().map(|f| f.component_id.clone()).collect(),
        }
    }
}

struct Frame {
    spec: Specification,
    name: String,
    depth: usize,
    parent: Option<ComponentId>,
    expansion: Expansion,
}

#[derive(Clone)]
pub struct Decomposer {
    store: Arc<dyn ArtifactStore>,
    generator: Arc<dyn Generator>,
    analyzer: Analyzer,
    guidance: Arc<[GuidanceDocument]>,
    config: Arc<RunConfig>,
}

impl Decomposer {
    #[must_use]
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        generator: Arc<dyn Generator>,
        guidance: Arc<[GuidanceDocument]>,
        config: Arc<RunConfig>,
    ) -> Self {
        Self {
            analyzer: Analyzer::new(Arc::clone(&generator), Arc::clone(&guidance)),
            store,
            generator,
            guidance,
            config,
        }
    }

    /// Decompose `root` into a flat list of leaf components.
    ///
    /// `root.location` must be the store key of its specification. A failure
    /// while expanding the root is returned as the error; failures below it
    /// abort only their branch (or the whole call under fail-fast).
    pub async fn decompose(
        &self,
        root: Specification,
        name: impl Into<String>,
    ) -> Result<Decomposition, SpecforgeError> {
        let root_id = root.id.clone();
        let expansion = self.expand(&root, 0).await?;

        let mut stack = vec![Frame {
            spec: root,
            name: name.into(),
            depth: 0,
            parent: None,
            expansion,
        }];
        let mut seen: HashSet<ComponentId> = HashSet::new();
        let mut entries = Vec::new();
        let mut components = Vec::new();
        let mut failures = Vec::new();
        let mut max_depth_reached = 0;

        while let Some(frame) = stack.pop() {
            if !seen.insert(frame.spec.id.clone()) {
                return Err(ConfigError::DuplicateComponentId { id: frame.spec.id }.into());
            }
            max_depth_reached = max_depth_reached.max(frame.depth);

            match frame.expansion {
                Expansion::Leaf => {
                    let entry = ManifestEntry {
                        component_id: frame.spec.id.clone(),
                        name: frame.name.clone(),
                        spec_reference: frame.spec.location.clone(),
                        depth: frame.depth,
                        parent: frame.parent.clone(),
                    };
                    components.push(self.leaf_component(&entry, &frame.spec.content)?);
                    entries.push(entry);
                }
                Expansion::NeedsSplit(children) => {
                    let depth = frame.depth + 1;
                    let specs: Vec<Specification> =
                        children.iter().map(|c| c.spec.clone()).collect();
                    let this = self.clone();
                    let results = BatchRunner::new(self.config.batch)
                        .run(specs, move |spec| {
                            let this = this.clone();
                            async move { this.expand(&spec, depth).await }
                        })
                        .await?;

                    let mut frames = Vec::with_capacity(children.len());
                    for (child, result) in children.into_iter().zip(results) {
                        match result {
                            Ok(expansion) => frames.push(Frame {
                                spec: child.spec,
                                name: child.name,
                                depth,
                                parent: Some(frame.spec.id.clone()),
                                expansion,
                            }),
                            Err(e) => {
                                warn!(
                                    component_id = %child.spec.id,
                                    depth,
                                    error = %e,
                                    "Decomposition branch failed"
                                );
                                failures.push(Failure::new(child.spec.id, &e));
                            }
                        }
                    }
                    stack.extend(frames.into_iter().rev());
                }
            }
        }

        info!(
            root = %root_id,
            leaves = components.len(),
            max_depth_reached,
            failed_branches = failures.len(),
            "Decomposition complete"
        );
        Ok(Decomposition {
            root: root_id,
            entries,
            components,
            max_depth_reached,
            failures,
        })
    }

    /// Expand one node: analyze it (or reuse the persisted analysis), then
    /// decide between leaf and split.
    pub async fn expand(
        &self,
        spec: &Specification,
        depth: usize,
    ) -> Result<Expansion, SpecforgeError> {
        async {
            let analysis = self.load_or_analyze(spec).await?;
            analysis.validate(&spec.id)?;

            if !analysis.needs_splitting {
                return Ok(Expansion::Leaf);
            }
            if depth >= self.config.max_depth {
                let degraded = SpecforgeError::RecursionLimitExceeded {
                    component_id: spec.id.clone(),
                    depth,
                    max_depth: self.config.max_depth,
                };
                warn!(component_id = %spec.id, depth, "{degraded}; treating it as a leaf");
                return Ok(Expansion::Leaf);
            }

            let children = self.split(spec, &analysis).await?;
            Ok(Expansion::NeedsSplit(children))
        }
        .instrument(decompose_span(&spec.id, depth))
        .await
    }

    async fn load_or_analyze(
        &self,
        spec: &Specification,
    ) -> Result<AnalysisResult, SpecforgeError> {
        let key = keys::analysis(&spec.id);
        if let Some(analysis) = self.store.get_json_opt::<AnalysisResult>(&key)? {
            log_step_complete(&spec.id, Task::Analyze.as_str(), &key, true);
            return Ok(analysis);
        }

        let analysis = self.analyzer.analyze(spec).await?;
        self.store.put_json(&key, &analysis)?;
        self.verify(&key)?;
        log_step_complete(&spec.id, Task::Analyze.as_str(), &key, false);
        Ok(analysis)
    }

    /// Produce the child specifications of a split, reusing any that exist.
    async fn split(
        &self,
        spec: &Specification,
        analysis: &AnalysisResult,
    ) -> Result<Vec<ChildSpec>, SpecforgeError> {
        let recommended = &analysis.recommended_components;

        let mut ids = HashSet::new();
        for child in recommended {
            if child.component_id == spec.id || !ids.insert(child.component_id.as_str()) {
                return Err(ConfigError::DuplicateComponentId {
                    id: child.component_id.clone(),
                }
                .into());
            }
        }

        let mut contents: BTreeMap<&str, String> = BTreeMap::new();
        for child in recommended {
            if let Some(content) = self.store.get_opt(&keys::initial_spec(&child.component_id))? {
                contents.insert(child.component_id.as_str(), content);
            }
        }

        if contents.len() < recommended.len() {
            let proposed = serde_json::to_string_pretty(recommended).map_err(|e| {
                SpecforgeError::generation(&spec.id, Task::Split.as_str(), GenerationError::Other(e.to_string()))
            })?;
            let request = GenerationRequest::new(
                Task::Split,
                spec.id.clone(),
                spec.content.clone(),
                OutputShape::Files {
                    names: recommended.iter().map(|c| c.component_id.clone()).collect(),
                },
            )
            .with_input("Proposed components", proposed)
            .with_guidance(Arc::clone(&self.guidance));

            let mut files = self
                .generator
                .generate(request)
                .await
                .and_then(|response| response.into_files(Task::Split))
                .map_err(|e| SpecforgeError::generation(&spec.id, Task::Split.as_str(), e))?;

            for child in recommended {
                if contents.contains_key(child.component_id.as_str()) {
                    continue;
                }
                let content = files.remove(&child.component_id).ok_or_else(|| {
                    SpecforgeError::generation(
                        &spec.id,
                        Task::Split.as_str(),
                        GenerationError::MissingChild {
                            component_id: child.component_id.clone(),
                        },
                    )
                })?;
                let key = keys::initial_spec(&child.component_id);
                self.store.put(&key, &content)?;
                self.verify(&key)?;
                log_step_complete(&child.component_id, "spec", &key, false);
                contents.insert(child.component_id.as_str(), self.store.get(&key)?);
            }
        }

        let record_key = keys::split(&spec.id);
        if !self.store.exists(&record_key)? {
            self.store.put_json(
                &record_key,
                &SplitRecord {
                    parent: spec.id.clone(),
                    children: recommended.clone(),
                },
            )?;
        }

        Ok(recommended
            .iter()
            .map(|child| ChildSpec {
                spec: Specification {
                    id: child.component_id.clone(),
                    location: keys::initial_spec(&child.component_id),
                    content: contents
                        .get(child.component_id.as_str())
                        .cloned()
                        .unwrap_or_default(),
                },
                name: child.name.clone(),
            })
            .collect())
    }

    /// Load the leaf's status record, creating it on first sight.
    fn leaf_component(
        &self,
        entry: &ManifestEntry,
        content: &str,
    ) -> Result<Component, SpecforgeError> {
        let key = keys::status(&entry.component_id);
        if let Some(existing) = self.store.get_json_opt::<Component>(&key)? {
            return Ok(existing);
        }

        let mut component = Component::new(
            entry.component_id.clone(),
            entry.name.clone(),
            entry.spec_reference.clone(),
        )
        .with_placement(entry.depth, entry.parent.clone());
        component.spec_hash = Some(content_hash(content));
        self.store.put_json(&key, &component)?;
        Ok(component)
    }

    fn verify(&self, key: &str) -> Result<(), SpecforgeError> {
        if self.store.exists(key)? {
            Ok(())
        } else {
            Err(SpecforgeError::ArtifactMissing {
                key: key.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::BatchOptions;
    use crate::test_support::{LossyStore, ScriptedGenerator};
    use specforge_store::MemoryArtifactStore;
    use specforge_utils::types::ComponentStatus;

    fn config(max_depth: usize) -> Arc<RunConfig> {
        Arc::new(RunConfig {
            max_depth,
            batch: BatchOptions {
                max_concurrency: 2,
                ..BatchOptions::default()
            },
            ..RunConfig::default()
        })
    }

    fn root(store: &MemoryArtifactStore) -> Specification {
        let location = keys::initial_spec("shop");
        store.put(&location, "# Shop\n").unwrap();
        Specification {
            id: "shop".to_string(),
            location,
            content: "# Shop\n".to_string(),
        }
    }

    fn decomposer(
        store: &Arc<MemoryArtifactStore>,
        generator: &Arc<ScriptedGenerator>,
        max_depth: usize,
    ) -> Decomposer {
        Decomposer::new(
            Arc::clone(store) as Arc<dyn ArtifactStore>,
            Arc::clone(generator) as Arc<dyn Generator>,
            Arc::from(Vec::new()),
            config(max_depth),
        )
    }

    #[tokio::test]
    async fn leaf_root_is_a_single_component() {
        let store = Arc::new(MemoryArtifactStore::new());
        let generator = Arc::new(ScriptedGenerator::new());
        let result = decomposer(&store, &generator, 3)
            .decompose(root(&store), "Shop")
            .await
            .unwrap();

        assert_eq!(result.entries.len(), 1);
        assert_eq!(result.components[0].component_id, "shop");
        assert_eq!(result.components[0].status, ComponentStatus::Initial);
        assert_eq!(result.max_depth_reached, 0);
        assert!(store.exists(&keys::status("shop")).unwrap());
    }

    #[tokio::test]
    async fn nested_splits_flatten_in_preorder() {
        let store = Arc::new(MemoryArtifactStore::new());
        let generator = Arc::new(
            ScriptedGenerator::new()
                .split("shop", &["cart", "payments"])
                .split("cart", &["cart-api", "cart-store"]),
        );
        let result = decomposer(&store, &generator, 3)
            .decompose(root(&store), "Shop")
            .await
            .unwrap();

        let ids: Vec<_> = result.entries.iter().map(|e| e.component_id.as_str()).collect();
        assert_eq!(ids, vec!["cart-api", "cart-store", "payments"]);
        assert_eq!(result.max_depth_reached, 2);
        assert_eq!(result.entries[0].parent.as_deref(), Some("cart"));
        assert!(store.exists("decomposition/cart/split.json").unwrap());
    }

    #[tokio::test]
    async fn depth_limit_degrades_to_leaf() {
        let store = Arc::new(MemoryArtifactStore::new());
        let generator = Arc::new(
            ScriptedGenerator::new()
                .split("shop", &["cart"])
                .split("cart", &["cart-api", "cart-store"]),
        );
        let result = decomposer(&store, &generator, 1)
            .decompose(root(&store), "Shop")
            .await
            .unwrap();

        let ids: Vec<_> = result.entries.iter().map(|e| e.component_id.as_str()).collect();
        assert_eq!(ids, vec!["cart"]);
        assert_eq!(result.max_depth_reached, 1);
        assert_eq!(generator.count_for(Task::Split, "cart"), 0);
    }

    #[tokio::test]
    async fn rerun_reuses_every_artifact() {
        let store = Arc::new(MemoryArtifactStore::new());
        let generator = Arc::new(ScriptedGenerator::new().split("shop", &["cart", "payments"]));
        let first = decomposer(&store, &generator, 3)
            .decompose(root(&store), "Shop")
            .await
            .unwrap();
        let calls = generator.call_count();

        let second = decomposer(&store, &generator, 3)
            .decompose(root(&store), "Shop")
            .await
            .unwrap();
        assert_eq!(generator.call_count(), calls);
        assert_eq!(first.manifest(3), second.manifest(3));
    }

    #[tokio::test]
    async fn empty_recommendation_is_a_config_error() {
        let store = Arc::new(MemoryArtifactStore::new());
        store
            .put_json(
                &keys::analysis("shop"),
                &AnalysisResult {
                    needs_splitting: true,
                    reasoning: "big".into(),
                    recommended_components: vec![],
                },
            )
            .unwrap();
        let generator = Arc::new(ScriptedGenerator::new());
        let err = decomposer(&store, &generator, 3)
            .decompose(root(&store), "Shop")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SpecforgeError::Config(ConfigError::EmptyRecommendation { .. })
        ));
    }

    #[tokio::test]
    async fn duplicate_ids_across_branches_are_rejected() {
        let store = Arc::new(MemoryArtifactStore::new());
        let generator = Arc::new(
            ScriptedGenerator::new()
                .split("shop", &["cart", "payments"])
                .split("payments", &["cart"]),
        );
        let err = decomposer(&store, &generator, 3)
            .decompose(root(&store), "Shop")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SpecforgeError::Config(ConfigError::DuplicateComponentId { ref id }) if id == "cart"
        ));
    }

    #[tokio::test]
    async fn failed_branch_is_recorded_and_siblings_continue() {
        let store = Arc::new(MemoryArtifactStore::new());
        let generator = Arc::new(
            ScriptedGenerator::new()
                .split("shop", &["cart", "payments"])
                .fail_task("cart", Task::Analyze),
        );
        let result = decomposer(&store, &generator, 3)
            .decompose(root(&store), "Shop")
            .await
            .unwrap();

        let ids: Vec<_> = result.entries.iter().map(|e| e.component_id.as_str()).collect();
        assert_eq!(ids, vec!["payments"]);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].component_id, "cart");
        assert!(!result.manifest(3).is_complete());
    }

    #[tokio::test]
    async fn existing_status_records_are_kept() {
        let store = Arc::new(MemoryArtifactStore::new());
        let mut progressed = Component::new("shop", "Shop", keys::initial_spec("shop"));
        progressed.status = ComponentStatus::Ready;
        store.put_json(&keys::status("shop"), &progressed).unwrap();

        let generator = Arc::new(ScriptedGenerator::new());
        let result = decomposer(&store, &generator, 3)
            .decompose(root(&store), "Shop")
            .await
            .unwrap();
        assert_eq!(result.components[0].status, ComponentStatus::Ready);
    }

    #[tokio::test]
    async fn unverified_analysis_fails_the_root() {
        let store = Arc::new(LossyStore::new("decomposition/shop/"));
        let generator = Arc::new(ScriptedGenerator::new());
        let location = keys::initial_spec("shop");
        store.put(&location, "# Shop\n").unwrap();
        let decomposer = Decomposer::new(
            Arc::clone(&store) as Arc<dyn ArtifactStore>,
            Arc::clone(&generator) as Arc<dyn Generator>,
            Arc::from(Vec::new()),
            config(3),
        );

        let err = decomposer
            .decompose(
                Specification {
                    id: "shop".to_string(),
                    location,
                    content: "# Shop\n".to_string(),
                },
                "Shop",
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SpecforgeError::ArtifactMissing { ref key } if key == "decomposition/shop/analysis.json"
        ));
        assert!(!store.exists(&keys::status("shop")).unwrap());
    }
}
