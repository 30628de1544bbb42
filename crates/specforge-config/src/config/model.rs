use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
pub const DEFAULT_MAX_DEPTH: usize = 3;
pub const DEFAULT_MAX_REVISIONS: u32 = 2;
pub const DEFAULT_CONCURRENCY: usize = 4;
pub const DEFAULT_GENERATION_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_PROVIDER: &str = "anthropic";
pub const DEFAULT_OUTPUT_DIR: &str = specforge_utils::paths::DEFAULT_OUTPUT_DIR;

/// Effective configuration after discovery.
///
/// Every `Option` in [`Defaults`] is populated once discovery or the builder
/// has run; accessors fall back to the documented defaults regardless.
#[derive(Debug, Clone)]
pub struct Config {
    pub defaults: Defaults,
    pub llm: LlmConfig,
    pub guidance: GuidanceConfig,
    /// Where each effective value came from
    pub source_attribution: HashMap<String, ConfigSource>,
}

/// `[defaults]` section.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Defaults {
    pub model: Option<String>,
    /// Maximum decomposition depth; nodes at this depth are leaves
    pub max_depth: Option<usize>,
    /// Automatic revision rounds before a component needs human review
    pub max_revisions: Option<u32>,
    /// Parallel tasks per batch; 0 means unbounded
    pub concurrency: Option<usize>,
    /// Minimum spacing between task dispatches, in milliseconds
    pub dispatch_delay_ms: Option<u64>,
    /// Stop a batch at its first failure
    pub fail_fast: Option<bool>,
    pub generation_timeout_secs: Option<u64>,
    pub output_dir: Option<String>,
    pub verbose: Option<bool>,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            model: Some(DEFAULT_MODEL.to_string()),
            max_depth: Some(DEFAULT_MAX_DEPTH),
            max_revisions: Some(DEFAULT_MAX_REVISIONS),
            concurrency: Some(DEFAULT_CONCURRENCY),
            dispatch_delay_ms: Some(0),
            fail_fast: Some(false),
            generation_timeout_secs: Some(DEFAULT_GENERATION_TIMEOUT_SECS),
            output_dir: Some(DEFAULT_OUTPUT_DIR.to_string()),
            verbose: Some(false),
        }
    }
}

/// `[llm]` section.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct LlmConfig {
    pub provider: Option<String>,
    pub anthropic: Option<AnthropicConfig>,
    /// Maximum generation calls per process
    pub budget: Option<u32>,
}

/// `[llm.anthropic]` section.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct AnthropicConfig {
    pub api_key_env: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

/// `[guidance]` section: documents handed to every generation call
/// (style guides, glossaries, architecture notes).
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct GuidanceConfig {
    #[serde(default)]
    pub documents: Vec<String>,
}

/// Origin of an effective configuration value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Cli,
    ConfigFile(PathBuf),
    Programmatic,
    Defaults,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cli => write!(f, "cli"),
            Self::ConfigFile(path) => write!(f, "config ({})", path.display()),
            Self::Programmatic => write!(f, "programmatic"),
            Self::Defaults => write!(f, "default"),
        }
    }
}
