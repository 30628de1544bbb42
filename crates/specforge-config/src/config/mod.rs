//! Configuration model, discovery, builder and validation.

mod builder;
mod cli_args;
mod discovery;
mod model;
mod validation;

pub use builder::ConfigBuilder;
pub use cli_args::CliArgs;
pub use discovery::PROVIDER_ENV_VAR;
pub use model::*;

use std::collections::BTreeMap;
use std::time::Duration;

impl Config {
    #[must_use]
    pub fn model(&self) -> String {
        self.defaults
            .model
            .clone()
            .unwrap_or_else(|| DEFAULT_MODEL.to_string())
    }

    #[must_use]
    pub fn max_depth(&self) -> usize {
        self.defaults.max_depth.unwrap_or(DEFAULT_MAX_DEPTH)
    }

    #[must_use]
    pub fn max_revisions(&self) -> u32 {
        self.defaults.max_revisions.unwrap_or(DEFAULT_MAX_REVISIONS)
    }

    /// Parallel tasks per batch; 0 means unbounded.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.defaults.concurrency.unwrap_or(DEFAULT_CONCURRENCY)
    }

    #[must_use]
    pub fn dispatch_delay(&self) -> Duration {
        Duration::from_millis(self.defaults.dispatch_delay_ms.unwrap_or(0))
    }

    #[must_use]
    pub fn fail_fast(&self) -> bool {
        self.defaults.fail_fast.unwrap_or(false)
    }

    #[must_use]
    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(
            self.defaults
                .generation_timeout_secs
                .unwrap_or(DEFAULT_GENERATION_TIMEOUT_SECS),
        )
    }

    #[must_use]
    pub fn output_dir(&self) -> String {
        self.defaults
            .output_dir
            .clone()
            .unwrap_or_else(|| DEFAULT_OUTPUT_DIR.to_string())
    }

    #[must_use]
    pub fn verbose(&self) -> bool {
        self.defaults.verbose.unwrap_or(false)
    }

    #[must_use]
    pub fn provider(&self) -> String {
        self.llm
            .provider
            .clone()
            .unwrap_or_else(|| DEFAULT_PROVIDER.to_string())
    }

    /// Effective values with their source labels, sorted by key.
    #[must_use]
    pub fn effective_config(&self) -> BTreeMap<String, (String, String)> {
        let label = |key: &str| {
            self.source_attribution
                .get(key)
                .map_or_else(|| ConfigSource::Defaults.to_string(), ToString::to_string)
        };

        let mut out = BTreeMap::new();
        let mut add = |key: &str, value: String| {
            out.insert(key.to_string(), (value, label(key)));
        };
        add("model", self.model());
        add("max_depth", self.max_depth().to_string());
        add("max_revisions", self.max_revisions().to_string());
        add("concurrency", self.concurrency().to_string());
        add(
            "dispatch_delay_ms",
            self.dispatch_delay().as_millis().to_string(),
        );
        add("fail_fast", self.fail_fast().to_string());
        add(
            "generation_timeout_secs",
            self.generation_timeout().as_secs().to_string(),
        );
        add("output_dir", self.output_dir());
        add("llm_provider", self.provider());
        if let Some(budget) = self.llm.budget {
            add("llm_budget", budget.to_string());
        }
        out
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl Config {
    /// Create a minimal Config for testing purposes, without discovery.
    pub fn minimal_for_testing() -> Self {
        Config {
            defaults: Defaults::default(),
            llm: LlmConfig {
                provider: Some(DEFAULT_PROVIDER.to_string()),
                ..LlmConfig::default()
            },
            guidance: GuidanceConfig::default(),
            source_attribution: std::collections::HashMap::new(),
        }
    }
}
