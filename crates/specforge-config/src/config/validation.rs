use specforge_utils::error::ConfigError;

use super::Config;

const MAX_DEPTH_LIMIT: usize = 16;
const MAX_REVISIONS_LIMIT: u32 = 10;
const MAX_CONCURRENCY_LIMIT: usize = 256;
const SUPPORTED_PROVIDERS: &[&str] = &["anthropic"];

fn invalid(key: &str, value: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.into(),
    }
}

impl Config {
    /// Validate configuration values
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if let Some(model) = &self.defaults.model
            && model.trim().is_empty()
        {
            return Err(invalid("model", "must not be empty"));
        }

        if let Some(depth) = self.defaults.max_depth
            && depth > MAX_DEPTH_LIMIT
        {
            return Err(invalid(
                "max_depth",
                format!("{depth} exceeds maximum limit of {MAX_DEPTH_LIMIT}"),
            ));
        }

        if let Some(revisions) = self.defaults.max_revisions
            && revisions > MAX_REVISIONS_LIMIT
        {
            return Err(invalid(
                "max_revisions",
                format!("{revisions} exceeds maximum limit of {MAX_REVISIONS_LIMIT}"),
            ));
        }

        if let Some(concurrency) = self.defaults.concurrency
            && concurrency > MAX_CONCURRENCY_LIMIT
        {
            return Err(invalid(
                "concurrency",
                format!("{concurrency} exceeds maximum limit of {MAX_CONCURRENCY_LIMIT}"),
            ));
        }

        if let Some(delay) = self.defaults.dispatch_delay_ms
            && delay > 60_000
        {
            return Err(invalid(
                "dispatch_delay_ms",
                "exceeds maximum limit of 60000 ms",
            ));
        }

        if let Some(timeout) = self.defaults.generation_timeout_secs {
            if timeout < 5 {
                return Err(invalid(
                    "generation_timeout_secs",
                    "must be at least 5 seconds",
                ));
            }
            if timeout > 7200 {
                return Err(invalid(
                    "generation_timeout_secs",
                    "exceeds maximum limit of 7200 seconds (2 hours)",
                ));
            }
        }

        if let Some(provider) = &self.llm.provider
            && !SUPPORTED_PROVIDERS.contains(&provider.as_str())
        {
            return Err(invalid(
                "provider",
                format!(
                    "unknown provider '{provider}' (supported: {})",
                    SUPPORTED_PROVIDERS.join(", ")
                ),
            ));
        }

        if self.llm.budget == Some(0) {
            return Err(invalid("budget", "must be greater than 0"));
        }

        if let Some(anthropic) = &self.llm.anthropic {
            if let Some(temperature) = anthropic.temperature
                && !(0.0..=1.0).contains(&temperature)
            {
                return Err(invalid("temperature", "must be between 0.0 and 1.0"));
            }
            if anthropic.max_tokens == Some(0) {
                return Err(invalid("max_tokens", "must be greater than 0"));
            }
        }

        Ok(())
    }
}
