//! LLM backend abstraction
//!
//! Generation calls go through the [`LlmBackend`] trait so the engine never
//! depends on a particular provider. [`from_config`] builds the configured
//! backend, wrapped in a [`BudgetedBackend`] when `[llm] budget` is set.

mod anthropic_backend;
mod budgeted_backend;
mod http_client;
mod types;

pub use anthropic_backend::{AnthropicBackend, HttpParams};
pub use budgeted_backend::BudgetedBackend;
pub use http_client::redact_error_message;
pub use specforge_utils::error::LlmError;
pub use types::{LlmBackend, LlmInvocation, LlmResult, Message, Role};

use specforge_config::Config;

/// Create the LLM backend named by `[llm] provider`.
///
/// # Errors
///
/// Returns `LlmError::Unsupported` for an unknown provider and
/// `LlmError::Misconfiguration` when the provider's settings are unusable
/// (for example a missing API key).
pub fn from_config(config: &Config) -> Result<Box<dyn LlmBackend>, LlmError> {
    let provider = config.provider();
    let backend: Box<dyn LlmBackend> = match provider.as_str() {
        "anthropic" => Box::new(AnthropicBackend::new_from_config(config)?),
        unknown => {
            return Err(LlmError::Unsupported(format!(
                "Unknown LLM provider '{unknown}'. Supported providers: anthropic."
            )));
        }
    };

    Ok(match config.llm.budget {
        Some(limit) => Box::new(BudgetedBackend::new(backend, limit)),
        None => backend,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_provider_is_unsupported() {
        let mut config = Config::minimal_for_testing();
        config.llm.provider = Some("carrier-pigeon".to_string());
        let err = from_config(&config).err().unwrap();
        assert!(matches!(err, LlmError::Unsupported(msg) if msg.contains("carrier-pigeon")));
    }
}
