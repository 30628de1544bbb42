use std::collections::HashMap;
use std::time::Duration;

use specforge_utils::error::ConfigError;

use super::{Config, ConfigSource, Defaults, GuidanceConfig, LlmConfig};
use super::model::DEFAULT_PROVIDER;

impl Config {
    /// Create a builder for programmatic configuration.
    ///
    /// ```rust
    /// use specforge_config::Config;
    /// use std::time::Duration;
    ///
    /// let config = Config::builder()
    ///     .max_depth(2)
    ///     .concurrency(8)
    ///     .dispatch_delay(Duration::from_millis(250))
    ///     .build()
    ///     .expect("valid config");
    /// assert_eq!(config.max_depth(), 2);
    /// ```
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }
}

/// Fluent builder for [`Config`] that bypasses file discovery.
///
/// Every value set here is attributed to [`ConfigSource::Programmatic`].
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    model: Option<String>,
    max_depth: Option<usize>,
    max_revisions: Option<u32>,
    concurrency: Option<usize>,
    dispatch_delay: Option<Duration>,
    fail_fast: Option<bool>,
    generation_timeout: Option<Duration>,
    output_dir: Option<String>,
    llm_provider: Option<String>,
    llm_budget: Option<u32>,
    guidance: Vec<String>,
}

impl ConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    #[must_use]
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    #[must_use]
    pub fn max_revisions(mut self, revisions: u32) -> Self {
        self.max_revisions = Some(revisions);
        self
    }

    /// Parallel tasks per batch; 0 means unbounded.
    #[must_use]
    pub fn concurrency(mut self, limit: usize) -> Self {
        self.concurrency = Some(limit);
        self
    }

    #[must_use]
    pub fn dispatch_delay(mut self, delay: Duration) -> Self {
        self.dispatch_delay = Some(delay);
        self
    }

    #[must_use]
    pub fn fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = Some(fail_fast);
        self
    }

    #[must_use]
    pub fn generation_timeout(mut self, timeout: Duration) -> Self {
        self.generation_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn output_dir(mut self, dir: impl Into<String>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn llm_provider(mut self, provider: impl Into<String>) -> Self {
        self.llm_provider = Some(provider.into());
        self
    }

    #[must_use]
    pub fn llm_budget(mut self, budget: u32) -> Self {
        self.llm_budget = Some(budget);
        self
    }

    #[must_use]
    pub fn guidance_document(mut self, path: impl Into<String>) -> Self {
        self.guidance.push(path.into());
        self
    }

    /// Build and validate the configuration.
    pub fn build(self) -> Result<Config, ConfigError> {
        let mut attribution = HashMap::new();
        let mut defaults = Defaults::default();
        let mut mark = |key: &str, set: bool| {
            let source = if set {
                ConfigSource::Programmatic
            } else {
                ConfigSource::Defaults
            };
            attribution.insert(key.to_string(), source);
        };

        mark("model", self.model.is_some());
        if self.model.is_some() {
            defaults.model = self.model;
        }
        mark("max_depth", self.max_depth.is_some());
        if self.max_depth.is_some() {
            defaults.max_depth = self.max_depth;
        }
        mark("max_revisions", self.max_revisions.is_some());
        if self.max_revisions.is_some() {
            defaults.max_revisions = self.max_revisions;
        }
        mark("concurrency", self.concurrency.is_some());
        if self.concurrency.is_some() {
            defaults.concurrency = self.concurrency;
        }
        mark("dispatch_delay_ms", self.dispatch_delay.is_some());
        if let Some(delay) = self.dispatch_delay {
            defaults.dispatch_delay_ms = Some(u64::try_from(delay.as_millis()).unwrap_or(u64::MAX));
        }
        mark("fail_fast", self.fail_fast.is_some());
        if self.fail_fast.is_some() {
            defaults.fail_fast = self.fail_fast;
        }
        mark("generation_timeout_secs", self.generation_timeout.is_some());
        if let Some(timeout) = self.generation_timeout {
            defaults.generation_timeout_secs = Some(timeout.as_secs());
        }
        mark("output_dir", self.output_dir.is_some());
        if self.output_dir.is_some() {
            defaults.output_dir = self.output_dir;
        }
        mark("llm_provider", self.llm_provider.is_some());
        if self.llm_budget.is_some() {
            mark("llm_budget", true);
        }

        let llm = LlmConfig {
            provider: Some(
                self.llm_provider
                    .unwrap_or_else(|| DEFAULT_PROVIDER.to_string()),
            ),
            anthropic: None,
            budget: self.llm_budget,
        };

        let config = Config {
            defaults,
            llm,
            guidance: GuidanceConfig {
                documents: self.guidance,
            },
            source_attribution: attribution,
        };
        config.validate()?;
        Ok(config)
    }
}
