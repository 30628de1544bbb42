//! Dependency extraction and ordering over ready components.
//!
//! Extraction is a best-effort scan of specification text. References are
//! recognized in three ways:
//!
//! - `@id` and `[[id]]` anywhere in the text
//! - backticked identifiers inside a dependency section (`## Dependencies`,
//!   `## Requires`, ...) or on an inline `Depends on:` line
//! - bare words inside those sections that name a known component
//!
//! Edges to components outside the ready set are pruned with a warning, and
//! cycles are broken during ordering rather than rejected.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use specforge_store::ArtifactStore;
use specforge_utils::error::SpecforgeError;
use specforge_utils::types::{Component, ComponentId, ComponentStatus};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

static HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s{0,3}#{1,6}\s+(.*?)[\s#]*$").unwrap());

static DEPENDENCY_HEADING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(dependencies|dependency|depends on|requires|requirements|prerequisites|uses)\b")
        .unwrap()
});

static INLINE_DEPENDENCIES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*(?:[-*]\s+)?(?:\*\*)?(?:depends on|dependencies|requires|uses)(?:\*\*)?\s*:(?:\*\*)?\s*(.+)$",
    )
    .unwrap()
});

static AT_REFERENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|[^\w@])@([A-Za-z0-9][A-Za-z0-9._-]*)").unwrap());

static WIKI_REFERENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\[([A-Za-z0-9][A-Za-z0-9._-]*)\]\]").unwrap());

static BACKTICKED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"`([A-Za-z0-9][A-Za-z0-9._-]*)`").unwrap());

static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z0-9][A-Za-z0-9._-]*").unwrap());

fn clean(token: &str) -> &str {
    token.trim_end_matches('.')
}

/// Component ids referenced by `text`, excluding `component_id` itself.
///
/// `known_ids` only gates bare-word matches; explicit references are returned
/// whether or not they are known, so the caller can report them.
#[must_use]
pub fn extract_dependencies(
    component_id: &str,
    text: &str,
    known_ids: &BTreeSet<ComponentId>,
) -> BTreeSet<ComponentId> {
    let mut found = BTreeSet::new();
    let mut in_section = false;

    let scan_dependency_text = |line: &str, found: &mut BTreeSet<ComponentId>| {
        for cap in BACKTICKED.captures_iter(line) {
            found.insert(clean(&cap[1]).to_string());
        }
        for word in WORD.find_iter(line) {
            let word = clean(word.as_str());
            if known_ids.contains(word) {
                found.insert(word.to_string());
            }
        }
    };

    for line in text.lines() {
        if let Some(cap) = HEADING.captures(line) {
            in_section = DEPENDENCY_HEADING.is_match(cap[1].trim());
            continue;
        }

        for cap in AT_REFERENCE.captures_iter(line) {
            found.insert(clean(&cap[1]).to_string());
        }
        for cap in WIKI_REFERENCE.captures_iter(line) {
            found.insert(cap[1].to_string());
        }

        if in_section {
            scan_dependency_text(line, &mut found);
        } else if let Some(cap) = INLINE_DEPENDENCIES.captures(line) {
            scan_dependency_text(&cap[1], &mut found);
        }
    }

    found.remove(component_id);
    found.retain(|id| !id.is_empty());
    found
}

/// An edge dropped because its target is not a ready component.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PrunedEdge {
    pub from: ComponentId,
    pub to: ComponentId,
}

/// Ready components and the components each one depends on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyGraph {
    pub edges: BTreeMap<ComponentId, BTreeSet<ComponentId>>,
    pub pruned: Vec<PrunedEdge>,
    /// Filled in once the graph has been ordered
    #[serde(default)]
    pub cycles: Vec<Vec<ComponentId>>,
}

/// Dependencies-first ordering of a graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopoOrder {
    pub order: Vec<ComponentId>,
    /// Cycles found; the edge closing each one was skipped
    pub cycles: Vec<Vec<ComponentId>>,
}

/// Builds the dependency graph of ready components from their current
/// specifications.
pub struct DependencyAnalyzer {
    store: Arc<dyn ArtifactStore>,
}

impl DependencyAnalyzer {
    #[must_use]
    pub fn new(store: Arc<dyn ArtifactStore>) -> Self {
        Self { store }
    }

    /// Extract dependencies for every `ready` component in `components`.
    /// Other components are neither nodes nor valid edge targets.
    pub fn build_graph(&self, components: &[Component]) -> Result<DependencyGraph, SpecforgeError> {
        let known: BTreeSet<ComponentId> =
            components.iter().map(|c| c.component_id.clone()).collect();
        let ready: BTreeSet<&str> = components
            .iter()
            .filter(|c| c.status == ComponentStatus::Ready)
            .map(|c| c.component_id.as_str())
            .collect();

        let mut graph = DependencyGraph::default();
        for component in components
            .iter()
            .filter(|c| c.status == ComponentStatus::Ready)
        {
            let text = self.store.get(&component.spec_reference)?;
            let mut deps = BTreeSet::new();
            for dep in extract_dependencies(&component.component_id, &text, &known) {
                if ready.contains(dep.as_str()) {
                    deps.insert(dep);
                } else {
                    warn!(
                        component_id = %component.component_id,
                        dependency = %dep,
                        "Dropping dependency on a component that is not ready"
                    );
                    graph.pruned.push(PrunedEdge {
                        from: component.component_id.clone(),
                        to: dep,
                    });
                }
            }
            debug!(
                component_id = %component.component_id,
                dependencies = deps.len(),
                "Dependencies extracted"
            );
            graph.edges.insert(component.component_id.clone(), deps);
        }
        Ok(graph)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Active,
    Done,
}

/// Order `edges` so every node follows its dependencies.
///
/// Depth-first over nodes and dependencies in sorted order, emitting in
/// postorder. A dependency that is still on the active path closes a cycle:
/// the cycle is logged and recorded, and that edge is skipped. The result is
/// always a permutation of every node (keys and dependency targets).
#[must_use]
pub fn topo_order(edges: &BTreeMap<ComponentId, BTreeSet<ComponentId>>) -> TopoOrder {
    let nodes: BTreeSet<&str> = edges
        .iter()
        .flat_map(|(id, deps)| std::iter::once(id.as_str()).chain(deps.iter().map(String::as_str)))
        .collect();
    let empty = BTreeSet::new();

    let mut marks: HashMap<&str, Mark> = HashMap::new();
    let mut result = TopoOrder::default();

    for &start in &nodes {
        if marks.contains_key(start) {
            continue;
        }
        // (node, its sorted dependencies, next dependency to visit)
        let mut path: Vec<(&str, Vec<&str>, usize)> = Vec::new();
        marks.insert(start, Mark::Active);
        let deps = edges.get(start).unwrap_or(&empty);
        path.push((start, deps.iter().map(String::as_str).collect(), 0));

        while let Some((node, deps, next)) = path.last_mut() {
            let node = *node;
            if let Some(&dep) = deps.get(*next) {
                *next += 1;
                match marks.get(dep) {
                    Some(Mark::Done) => {}
                    Some(Mark::Active) => {
                        let begin = path.iter().position(|(n, _, _)| *n == dep).unwrap_or(0);
                        let mut cycle: Vec<ComponentId> =
                            path[begin..].iter().map(|(n, _, _)| (*n).to_string()).collect();
                        cycle.push(dep.to_string());
                        let err = SpecforgeError::CycleDetected {
                            cycle: cycle.clone(),
                        };
                        warn!(from = %node, to = %dep, "{err}; skipping the closing edge");
                        result.cycles.push(cycle);
                    }
                    None => {
                        marks.insert(dep, Mark::Active);
                        let deps = edges.get(dep).unwrap_or(&empty);
                        path.push((dep, deps.iter().map(String::as_str).collect(), 0));
                    }
                }
            } else {
                marks.insert(node, Mark::Done);
                result.order.push(node.to_string());
                path.pop();
            }
        }
    }

    result
}
