//! Recursive decomposition and dependency-ordered processing of specifications.
//!
//! The engine is built leaves first:
//!
//! - [`batch::BatchRunner`] maps an async function over items with bounded
//!   concurrency, dispatch spacing and optional fail-fast.
//! - [`analyzer::Analyzer`] asks the [`generation::Generator`] whether a
//!   specification must be split.
//! - [`decomposer::Decomposer`] applies the analyzer down to a depth limit and
//!   produces a flat manifest of leaf components.
//! - [`processor::ComponentProcessor`] drives one leaf through questions,
//!   answers and evaluation with a bounded revision budget.
//! - [`review::ReviewManager`] hands stalled components to a human and
//!   evaluates the edited specification.
//! - [`deps`] builds a dependency graph over ready components and orders it.
//! - [`pipeline::Pipeline`] runs the stages and writes the run summary.
//!
//! Every step checks the [`ArtifactStore`](specforge_store::ArtifactStore)
//! before calling the generator, so an interrupted run resumes where it
//! stopped.

pub mod analyzer;
pub mod batch;
pub mod decomposer;
pub mod deps;
pub mod generation;
pub mod pipeline;
pub mod processor;
pub mod review;
pub mod run_config;
pub mod sink;
pub mod summary;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;

pub use analyzer::Analyzer;
pub use batch::{BatchOptions, BatchRunner};
pub use decomposer::{ChildSpec, Decomposer, Decomposition, Expansion};
pub use deps::{
    DependencyAnalyzer, DependencyGraph, PrunedEdge, TopoOrder, extract_dependencies, topo_order,
};
pub use generation::{
    Evaluation, GenerationRequest, GenerationResponse, Generator, GuidanceDocument, LlmGenerator,
    OutputShape, Task,
};
pub use pipeline::{Ordering, Pipeline, Stage, order_components, order_from_store};
pub use processor::ComponentProcessor;
pub use review::{ReviewBundle, ReviewManager, prepare_bundle};
pub use run_config::RunConfig;
pub use sink::{GenerationSink, Handoff, HandoffEntry, ManifestSink};
pub use summary::{
    ComponentOutcome, Failure, Manifest, ManifestEntry, Outcome, RunSummary, StatusReport,
};
