use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::error::ConfigError;

/// Identifier of a specification node. Sanitized with
/// [`sanitize_component_id`](crate::component_id::sanitize_component_id)
/// before it is used in a key.
pub type ComponentId = String;

/// A specification document: the initial input or one written by the
/// decomposer. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Specification {
    pub id: ComponentId,
    /// Artifact key (or input path for the root) the content was read from
    pub location: String,
    pub content: String,
}

/// A component the analyzer proposes when a specification must be split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendedComponent {
    pub component_id: ComponentId,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Decision about whether a specification must be split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub needs_splitting: bool,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub recommended_components: Vec<RecommendedComponent>,
}

impl AnalysisResult {
    /// A leaf decision with the given reasoning.
    #[must_use]
    pub fn leaf(reasoning: impl Into<String>) -> Self {
        Self {
            needs_splitting: false,
            reasoning: reasoning.into(),
            recommended_components: Vec::new(),
        }
    }

    /// Check the shape invariants: no recommendations on a leaf decision,
    /// and at least one recommendation on a split decision.
    pub fn validate(&self, component_id: &str) -> Result<(), ConfigError> {
        match (self.needs_splitting, self.recommended_components.is_empty()) {
            (true, true) => Err(ConfigError::EmptyRecommendation {
                component_id: component_id.to_string(),
            }),
            (false, false) => Err(ConfigError::InconsistentAnalysis {
                component_id: component_id.to_string(),
            }),
            _ => Ok(()),
        }
    }
}

/// Lifecycle status of a leaf component.
///
/// ```text
/// initial -> questions_generated -> answers_generated -> evaluated_pass -> ready
///                  ^                                   \-> evaluated_fail
///                  |                                          |
///                  +---------- (revision_count < max) --------+
///                                                             \-> needs_human_review
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentStatus {
    Initial,
    QuestionsGenerated,
    AnswersGenerated,
    EvaluatedPass,
    EvaluatedFail,
    NeedsHumanReview,
    Ready,
}

impl ComponentStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::QuestionsGenerated => "questions_generated",
            Self::AnswersGenerated => "answers_generated",
            Self::EvaluatedPass => "evaluated_pass",
            Self::EvaluatedFail => "evaluated_fail",
            Self::NeedsHumanReview => "needs_human_review",
            Self::Ready => "ready",
        }
    }

    /// Statuses the automatic processor does not advance further.
    #[must_use]
    pub const fn is_settled(&self) -> bool {
        matches!(self, Self::Ready | Self::NeedsHumanReview)
    }
}

impl fmt::Display for ComponentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A leaf component and its processing state. Persisted as one JSON status
/// record per component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    pub component_id: ComponentId,
    pub name: String,
    /// Key of the current specification artifact
    pub spec_reference: String,
    pub status: ComponentStatus,
    /// Automatic revision rounds used so far
    pub revision_count: u32,
    /// Human review rounds submitted so far
    #[serde(default)]
    pub human_revision_count: u32,
    #[serde(default)]
    pub dependencies: BTreeSet<ComponentId>,
    #[serde(default)]
    pub questions_reference: Option<String>,
    #[serde(default)]
    pub answers_reference: Option<String>,
    #[serde(default)]
    pub evaluation_reference: Option<String>,
    /// BLAKE3 of the current specification content
    #[serde(default)]
    pub spec_hash: Option<String>,
    #[serde(default)]
    pub depth: usize,
    #[serde(default)]
    pub parent: Option<ComponentId>,
}

impl Component {
    #[must_use]
    pub fn new(
        component_id: impl Into<ComponentId>,
        name: impl Into<String>,
        spec_reference: impl Into<String>,
    ) -> Self {
        Self {
            component_id: component_id.into(),
            name: name.into(),
            spec_reference: spec_reference.into(),
            status: ComponentStatus::Initial,
            revision_count: 0,
            human_revision_count: 0,
            dependencies: BTreeSet::new(),
            questions_reference: None,
            answers_reference: None,
            evaluation_reference: None,
            spec_hash: None,
            depth: 0,
            parent: None,
        }
    }

    #[must_use]
    pub fn with_placement(mut self, depth: usize, parent: Option<ComponentId>) -> Self {
        self.depth = depth;
        self.parent = parent;
        self
    }
}

/// How far a run proceeds before returning control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Run every stage to completion
    #[default]
    Auto,
    /// Stop after each stage; the next invocation resumes from artifacts
    StepThrough,
}

impl RunMode {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::StepThrough => "step_through",
        }
    }
}

/// Error kinds recorded in run summaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ConfigError,
    GenerationFailure,
    ArtifactMissing,
    CycleDetected,
    RecursionLimitExceeded,
    Store,
    Internal,
}
