use specforge_config::Config;
use specforge_config::config::{
    DEFAULT_CONCURRENCY, DEFAULT_GENERATION_TIMEOUT_SECS, DEFAULT_MAX_DEPTH,
    DEFAULT_MAX_REVISIONS, DEFAULT_MODEL,
};
use specforge_utils::types::RunMode;
use std::time::Duration;

use crate::batch::BatchOptions;

/// Immutable settings threaded through one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// Deepest split level; a node at this depth is treated as a leaf
    pub max_depth: usize,
    /// Automatic revision rounds before escalating to human review
    pub max_revisions: u32,
    pub batch: BatchOptions,
    pub run_mode: RunMode,
    pub model: String,
    pub generation_timeout: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_revisions: DEFAULT_MAX_REVISIONS,
            batch: BatchOptions {
                max_concurrency: DEFAULT_CONCURRENCY,
                ..BatchOptions::default()
            },
            run_mode: RunMode::Auto,
            model: DEFAULT_MODEL.to_string(),
            generation_timeout: Duration::from_secs(DEFAULT_GENERATION_TIMEOUT_SECS),
        }
    }
}

impl RunConfig {
    #[must_use]
    pub fn from_config(config: &Config, run_mode: RunMode) -> Self {
        Self {
            max_depth: config.max_depth(),
            max_revisions: config.max_revisions(),
            batch: BatchOptions {
                max_concurrency: config.concurrency(),
                delay: config.dispatch_delay(),
                fail_fast: config.fail_fast(),
            },
            run_mode,
            model: config.model(),
            generation_timeout: config.generation_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_from_config() {
        let config = Config::builder()
            .max_depth(1)
            .max_revisions(0)
            .concurrency(0)
            .fail_fast(true)
            .dispatch_delay(Duration::from_millis(15))
            .build()
            .unwrap();
        let run = RunConfig::from_config(&config, RunMode::StepThrough);

        assert_eq!(run.max_depth, 1);
        assert_eq!(run.max_revisions, 0);
        assert_eq!(run.batch.max_concurrency, 0);
        assert!(run.batch.fail_fast);
        assert_eq!(run.batch.delay, Duration::from_millis(15));
        assert_eq!(run.run_mode, RunMode::StepThrough);
    }

    #[test]
    fn defaults_match_config_defaults() {
        let from_config = RunConfig::from_config(&Config::minimal_for_testing(), RunMode::Auto);
        assert_eq!(from_config, RunConfig::default());
    }
}
