//! specforge - recursive specification decomposition with resumable artifacts
//!
//! specforge takes one top-level specification, splits it into leaf
//! components down to a depth limit, refines each leaf through a
//! question / answer / evaluation loop with a bounded revision budget, hands
//! stalled components to a human reviewer, and finally orders the ready
//! components so dependencies come first.
//!
//! Every intermediate result is an artifact in an output directory. A run
//! that is interrupted, or repeated, loads what exists instead of
//! regenerating it.
//!
//! # Quick Start (CLI)
//!
//! ```bash
//! # Decompose and refine a specification
//! specforge run specs/shop.md --out out/
//!
//! # One stage at a time
//! specforge run specs/shop.md --out out/ --step-through
//!
//! # Inspect progress without running anything
//! specforge status --out out/ --json
//!
//! # Hand a stalled component to a human, then submit the edit
//! specforge review prepare payments --out out/
//! specforge review submit payments --file payments.md --out out/
//! ```
//!
//! # Quick Start (Library)
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use specforge::{ArtifactStore, Config, FsArtifactStore, LlmGenerator, Pipeline, RunConfig};
//! use specforge::types::{RunMode, Specification};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let config = Config::builder().max_depth(2).build()?;
//! let store: Arc<dyn ArtifactStore> = Arc::new(FsArtifactStore::open("out")?);
//! let backend = Arc::from(specforge::llm::from_config(&config)?);
//! let generator = Arc::new(LlmGenerator::new(backend, config.model(), config.generation_timeout()));
//!
//! let pipeline = Pipeline::new(store, generator, RunConfig::from_config(&config, RunMode::Auto));
//! let summary = pipeline
//!     .run(&Specification {
//!         id: "shop".into(),
//!         location: "specs/shop.md".into(),
//!         content: std::fs::read_to_string("specs/shop.md")?,
//!     })
//!     .await?;
//! println!("{}", summary.render_text());
//! # Ok(())
//! # }
//! ```
//!
//! # JSON Output
//!
//! Persisted JSON artifacts and `--json` output are emitted in JCS (RFC 8785)
//! canonical form, so identical state produces identical bytes.

pub mod cli;

pub use specforge_config::{CliArgs, Config, ConfigBuilder, ConfigSource};
pub use specforge_engine::{
    Analyzer, BatchOptions, BatchRunner, ComponentProcessor, Decomposer, DependencyAnalyzer,
    DependencyGraph, Evaluation, GenerationRequest, GenerationResponse, GenerationSink, Generator,
    GuidanceDocument, LlmGenerator, Manifest, ManifestSink, Ordering, OutputShape, Pipeline,
    ReviewBundle, ReviewManager, RunConfig, RunSummary, Stage, StatusReport, Task, TopoOrder,
    extract_dependencies, order_from_store, prepare_bundle, topo_order,
};
pub use specforge_store::{
    ArtifactStore, ArtifactStoreExt, FsArtifactStore, MemoryArtifactStore, Revision, Step, keys,
};
pub use specforge_utils::canonicalization::emit_jcs;
pub use specforge_utils::error::{SpecforgeError, UserFriendlyError};
pub use specforge_utils::exit_codes::ExitCode;
pub use specforge_utils::types;

/// LLM backends behind [`LlmGenerator`].
pub mod llm {
    pub use specforge_llm::{
        AnthropicBackend, BudgetedBackend, LlmBackend, LlmError, LlmInvocation, LlmResult,
        from_config,
    };
}
