//! Deterministic artifact keys.
//!
//! ```text
//! manifest.json                              flat leaf manifest
//! decomposition/<id>/analysis.json           analyzer decision for a node
//! decomposition/<id>/split.json              children produced by a split
//! components/<id>/<step>/<revision>.<ext>    per-step artifacts
//! status/<id>.json                           component status record
//! review/<id>/...                            human review bundle
//! dependencies.json                          dependency graph
//! generation_order.json                      topological order
//! summary.json                               run summary
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

pub const MANIFEST: &str = "manifest.json";
pub const DEPENDENCIES: &str = "dependencies.json";
pub const GENERATION_ORDER: &str = "generation_order.json";
pub const SUMMARY: &str = "summary.json";
pub const HANDOFF: &str = "handoff.json";

/// A processing step that produces an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// A specification written by the decomposer or by a human reviewer
    Spec,
    Questions,
    Answers,
    /// Specification revised alongside the answers
    Revised,
    Evaluation,
}

impl Step {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Spec => "spec",
            Self::Questions => "questions",
            Self::Answers => "answers",
            Self::Revised => "revised",
            Self::Evaluation => "evaluation",
        }
    }

    #[must_use]
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Evaluation => "json",
            _ => "md",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Revision tag of an artifact: automatic rounds (`r0`, `r1`, ...) and human
/// review rounds (`h1`, `h2`, ...) never share a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Revision {
    Auto(u32),
    Human(u32),
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto(n) => write!(f, "r{n}"),
            Self::Human(n) => write!(f, "h{n}"),
        }
    }
}

#[must_use]
pub fn component_artifact(component_id: &str, step: Step, revision: Revision) -> String {
    format!(
        "components/{component_id}/{}/{revision}.{}",
        step.as_str(),
        step.extension()
    )
}

/// Key of the specification a component starts from.
#[must_use]
pub fn initial_spec(component_id: &str) -> String {
    component_artifact(component_id, Step::Spec, Revision::Auto(0))
}

#[must_use]
pub fn status(component_id: &str) -> String {
    format!("status/{component_id}.json")
}

#[must_use]
pub fn analysis(component_id: &str) -> String {
    format!("decomposition/{component_id}/analysis.json")
}

#[must_use]
pub fn split(component_id: &str) -> String {
    format!("decomposition/{component_id}/split.json")
}

#[must_use]
pub fn review_dir(component_id: &str) -> String {
    format!("review/{component_id}")
}

#[must_use]
pub fn review_file(component_id: &str, name: &str) -> String {
    format!("review/{component_id}/{name}")
}
