//! CLI argument definitions and parsing structures

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// specforge - recursive specification decomposition and refinement
#[derive(Parser, Debug)]
#[command(name = "specforge")]
#[command(about = "Decompose a specification into refined, dependency-ordered components")]
#[command(long_about = r#"
specforge splits a top-level specification into leaf components, refines each
one through questions, answers and evaluation, hands stalled components to a
human reviewer, and orders the ready components so dependencies come first.

EXAMPLES:
  # Run every stage
  specforge run specs/shop.md --out out/

  # Stop after each stage (decompose, process, order)
  specforge run specs/shop.md --out out/ --step-through

  # Show progress without running anything
  specforge status --out out/

  # Prepare a review bundle, then submit the edited specification
  specforge review prepare payments --out out/
  specforge review submit payments --file payments.md --out out/

  # Recompute the generation order from persisted records
  specforge order --out out/

CONFIGURATION:
  Configuration is loaded with precedence: CLI flags > config file > defaults
  The config file is discovered by searching upward from CWD for .specforge/config.toml
  Use --config to specify an explicit config file path

EXIT CODES:
  0 success, 1 internal error, 2 invalid arguments or configuration,
  3 components awaiting human review, 70 generation failure
"#)]
#[command(version)]
pub struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Output directory holding all artifacts
    #[arg(long = "out", global = true, value_name = "DIR")]
    pub out: Option<String>,

    /// Model to use for generation calls
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// LLM provider (anthropic)
    #[arg(long, global = true)]
    pub provider: Option<String>,

    /// Maximum decomposition depth (default: 3)
    #[arg(long, global = true)]
    pub max_depth: Option<usize>,

    /// Automatic revision rounds before human review (default: 2)
    #[arg(long, global = true)]
    pub max_revisions: Option<u32>,

    /// Maximum concurrent generation tasks, 0 for unbounded (default: 4)
    #[arg(long, global = true)]
    pub concurrency: Option<usize>,

    /// Minimum spacing between task dispatches in milliseconds
    #[arg(long = "delay-ms", global = true)]
    pub delay_ms: Option<u64>,

    /// Stop dispatching on the first failure
    #[arg(long, global = true)]
    pub fail_fast: bool,

    /// Timeout for a single generation call in seconds
    #[arg(long, global = true)]
    pub generation_timeout: Option<u64>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Decompose, refine and order a specification
    Run {
        /// Top-level specification file
        spec: PathBuf,

        /// Discard existing artifacts in the output directory first
        #[arg(long)]
        fresh: bool,

        /// Stop after each stage; run again to continue
        #[arg(long)]
        step_through: bool,

        /// Guidance document passed to every generation call (repeatable)
        #[arg(long = "guidance", value_name = "FILE")]
        guidance: Vec<String>,

        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show persisted progress without running anything
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Human review of components that exhausted their revision budget
    #[command(subcommand)]
    Review(ReviewCommands),

    /// Recompute dependencies and generation order from persisted records
    Order {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum ReviewCommands {
    /// Copy a component's artifacts into review/<ID>/ with instructions
    Prepare {
        /// Component ID
        id: String,
    },

    /// Submit an edited specification and evaluate it
    Submit {
        /// Component ID
        id: String,

        /// Edited specification file
        #[arg(long, value_name = "EDITED")]
        file: PathBuf,
    },
}
