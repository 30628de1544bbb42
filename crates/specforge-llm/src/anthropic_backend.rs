//! Anthropic Messages API backend

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use specforge_config::Config;
use std::sync::Arc;
use tracing::debug;

use crate::LlmError;
use crate::http_client::HttpClient;
use crate::types::{LlmBackend, LlmInvocation, LlmResult, Message, Role};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1/messages";

const ANTHROPIC_VERSION: &str = "2023-06-01";

const DEFAULT_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

const PROVIDER: &str = "anthropic";

/// Sampling parameters sent with every request unless overridden
#[derive(Debug, Clone, PartialEq)]
pub struct HttpParams {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for HttpParams {
    fn default() -> Self {
        // Specs and evaluations run long; 2048 tokens truncates them.
        Self {
            max_tokens: 8192,
            temperature: 0.2,
        }
    }
}

#[derive(Clone)]
pub struct AnthropicBackend {
    client: Arc<HttpClient>,
    base_url: String,
    api_key: String,
    default_model: String,
    default_params: HttpParams,
}

impl std::fmt::Debug for AnthropicBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicBackend")
            .field("base_url", &self.base_url)
            .field("default_model", &self.default_model)
            .field("default_params", &self.default_params)
            .finish_non_exhaustive()
    }
}

impl AnthropicBackend {
    /// # Errors
    ///
    /// Returns `LlmError::Misconfiguration` if the HTTP client cannot be built.
    pub fn new(
        api_key: String,
        base_url: Option<String>,
        default_model: String,
        default_params: HttpParams,
    ) -> Result<Self, LlmError> {
        Ok(Self {
            client: Arc::new(HttpClient::new()?),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key,
            default_model,
            default_params,
        })
    }

    /// Build the backend from `[llm.anthropic]`.
    ///
    /// The API key is read from the variable named by `api_key_env`
    /// (`ANTHROPIC_API_KEY` when unset). The model falls back to
    /// `[defaults] model`.
    ///
    /// # Errors
    ///
    /// Returns `LlmError::Misconfiguration` when the key variable is unset or
    /// empty.
    pub fn new_from_config(config: &Config) -> Result<Self, LlmError> {
        let section = config.llm.anthropic.clone().unwrap_or_default();

        let api_key_env = section
            .api_key_env
            .as_deref()
            .unwrap_or(DEFAULT_API_KEY_ENV);
        let api_key = std::env::var(api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                LlmError::Misconfiguration(format!(
                    "Anthropic API key not found in environment variable '{api_key_env}'. \
                     Set it or point [llm.anthropic] api_key_env at another variable."
                ))
            })?;

        let defaults = HttpParams::default();
        let params = HttpParams {
            max_tokens: section.max_tokens.unwrap_or(defaults.max_tokens),
            temperature: section.temperature.unwrap_or(defaults.temperature),
        };
        let model = section.model.unwrap_or_else(|| config.model());

        Self::new(api_key, section.base_url, model, params)
    }

    /// Per-call overrides: a non-empty `inv.model`, then `max_tokens` and
    /// `temperature` from metadata.
    fn resolve_params(&self, inv: &LlmInvocation) -> (String, HttpParams) {
        let model = if inv.model.is_empty() {
            self.default_model.clone()
        } else {
            inv.model.clone()
        };

        let max_tokens = inv
            .metadata
            .get("max_tokens")
            .and_then(serde_json::Value::as_u64)
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(self.default_params.max_tokens);

        #[allow(clippy::cast_possible_truncation)]
        let temperature = inv
            .metadata
            .get("temperature")
            .and_then(serde_json::Value::as_f64)
            .map_or(self.default_params.temperature, |v| v as f32);

        (
            model,
            HttpParams {
                max_tokens,
                temperature,
            },
        )
    }

    /// Split system prompts out of the conversation; the Messages API takes
    /// them in a separate field.
    fn convert_messages(messages: &[Message]) -> (Option<String>, Vec<AnthropicMessage>) {
        let mut system: Vec<&str> = Vec::new();
        let mut converted = Vec::new();

        for msg in messages {
            let role = match msg.role {
                Role::System => {
                    system.push(&msg.content);
                    continue;
                }
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            converted.push(AnthropicMessage {
                role: role.to_string(),
                content: msg.content.clone(),
            });
        }

        let system = (!system.is_empty()).then(|| system.join("\n\n"));
        (system, converted)
    }

    /// Turn a response body into an [`LlmResult`], joining all text blocks.
    fn parse_response(body: AnthropicResponse, model: String) -> Result<LlmResult, LlmError> {
        let content: String = body
            .content
            .iter()
            .filter(|block| block.content_type == "text")
            .filter_map(|block| block.text.as_deref())
            .collect();

        if content.is_empty() {
            return Err(LlmError::Transport(
                "Anthropic response missing text content".to_string(),
            ));
        }

        let mut result = LlmResult::new(content, PROVIDER, model);
        if let Some(usage) = body.usage {
            result = result.with_tokens(usage.input_tokens, usage.output_tokens);
        }
        result.stop_reason = body.stop_reason;
        Ok(result)
    }
}

#[async_trait]
impl LlmBackend for AnthropicBackend {
    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, LlmError> {
        let (model, params) = self.resolve_params(&inv);

        debug!(
            provider = PROVIDER,
            component = %inv.component_id,
            task = %inv.task,
            model = %model,
            max_tokens = params.max_tokens,
            timeout_secs = inv.timeout.as_secs(),
            "Invoking Anthropic backend"
        );

        let (system, messages) = Self::convert_messages(&inv.messages);
        let request_body = AnthropicRequest {
            model: model.clone(),
            messages,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            system,
        };

        let request = self
            .client
            .inner()
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request_body);

        let response = self
            .client
            .execute_with_retry(request, inv.timeout, PROVIDER)
            .await?;

        let body: AnthropicResponse = response.json().await.map_err(|e| {
            LlmError::Transport(format!("Failed to parse Anthropic response: {e}"))
        })?;

        let result = Self::parse_response(body, model)?;
        debug!(
            provider = PROVIDER,
            component = %inv.component_id,
            tokens_input = ?result.tokens_input,
            tokens_output = ?result.tokens_output,
            truncated = result.was_truncated(),
            "Anthropic invocation completed"
        );
        Ok(result)
    }
}

#[derive(Debug, Clone, Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    usage: Option<Usage>,
}

#[derive(Debug, Clone, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct Usage {
    input_tokens: u64,
    output_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn backend() -> AnthropicBackend {
        AnthropicBackend::new(
            "test-key".to_string(),
            None,
            "default-model".to_string(),
            HttpParams {
                max_tokens: 1024,
                temperature: 0.5,
            },
        )
        .unwrap()
    }

    #[test]
    fn empty_model_uses_backend_default() {
        let inv = LlmInvocation::new("auth", "questions", "", Duration::from_secs(60), vec![]);
        let (model, params) = backend().resolve_params(&inv);
        assert_eq!(model, "default-model");
        assert_eq!(params.max_tokens, 1024);
        assert!((params.temperature - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn invocation_overrides_model_and_params() {
        let inv = LlmInvocation::new("auth", "questions", "other", Duration::from_secs(60), vec![])
            .with_metadata("max_tokens", serde_json::json!(300))
            .with_metadata("temperature", serde_json::json!(0.0));
        let (model, params) = backend().resolve_params(&inv);
        assert_eq!(model, "other");
        assert_eq!(params.max_tokens, 300);
        assert!(params.temperature.abs() < f32::EPSILON);
    }

    #[test]
    fn system_messages_are_joined_and_separated() {
        let messages = vec![
            Message::system("You write specs."),
            Message::user("Split this."),
            Message::system("Use Markdown."),
            Message::assistant("Ok."),
        ];
        let (system, converted) = AnthropicBackend::convert_messages(&messages);
        assert_eq!(system.as_deref(), Some("You write specs.\n\nUse Markdown."));
        let roles: Vec<_> = converted.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["user", "assistant"]);
    }

    #[test]
    fn no_system_messages_means_no_system_field() {
        let (system, _) = AnthropicBackend::convert_messages(&[Message::user("hi")]);
        assert!(system.is_none());
    }

    #[test]
    fn response_text_blocks_are_concatenated() {
        let body: AnthropicResponse = serde_json::from_value(serde_json::json!({
            "content": [
                {"type": "text", "text": "Hello, "},
                {"type": "tool_use", "id": "x"},
                {"type": "text", "text": "world"}
            ],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 12, "output_tokens": 3}
        }))
        .unwrap();

        let result = AnthropicBackend::parse_response(body, "m".to_string()).unwrap();
        assert_eq!(result.raw_response, "Hello, world");
        assert_eq!(result.tokens_input, Some(12));
        assert_eq!(result.tokens_output, Some(3));
        assert!(!result.was_truncated());
    }

    #[test]
    fn response_without_text_is_an_error() {
        let body: AnthropicResponse =
            serde_json::from_value(serde_json::json!({"content": [], "usage": null})).unwrap();
        let err = AnthropicBackend::parse_response(body, "m".to_string()).unwrap_err();
        assert!(matches!(err, LlmError::Transport(_)));
    }

    #[test]
    fn missing_key_variable_is_misconfiguration() {
        let mut config = Config::minimal_for_testing();
        config.llm.anthropic = Some(specforge_config::AnthropicConfig {
            api_key_env: Some("SPECFORGE_TEST_KEY_THAT_IS_NEVER_SET".to_string()),
            ..Default::default()
        });
        let err = AnthropicBackend::new_from_config(&config).unwrap_err();
        assert!(matches!(err, LlmError::Misconfiguration(_)));
    }
}
