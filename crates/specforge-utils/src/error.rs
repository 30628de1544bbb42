use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::component_id::ComponentIdError;
use crate::types::ErrorKind;

/// Library-level error type with user-friendly reporting.
///
/// `SpecforgeError` is what the engine returns from decomposition, component
/// processing, review and ordering. Step-local failures abort only the
/// component or branch that raised them; the run-level orchestrator collects
/// them into the run summary by [`ErrorKind`].
///
/// # Exit Code Mapping
///
/// | Exit Code | Error Type |
/// |-----------|------------|
/// | 2 | Configuration errors, missing input specification |
/// | 70 | Generation failures |
/// | 1 | Everything else |
///
/// ```rust
/// use specforge_utils::error::{ConfigError, SpecforgeError};
/// use specforge_utils::exit_codes::ExitCode;
///
/// let err = SpecforgeError::Config(ConfigError::DuplicateComponentId { id: "db".into() });
/// assert_eq!(err.to_exit_code(), ExitCode::CLI_ARGS);
/// ```
#[derive(Error, Debug)]
pub enum SpecforgeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Generation failed for {component_id} at {step}: {source}")]
    Generation {
        component_id: String,
        step: String,
        #[source]
        source: GenerationError,
    },

    #[error("Artifact missing after write: {key}")]
    ArtifactMissing { key: String },

    #[error("Input specification not found: {location}")]
    InputMissing { location: String },

    #[error("Dependency cycle detected: {}", cycle.join(" -> "))]
    CycleDetected { cycle: Vec<String> },

    #[error("Recursion limit reached for {component_id} at depth {depth} (max {max_depth})")]
    RecursionLimitExceeded {
        component_id: String,
        depth: usize,
        max_depth: usize,
    },

    #[error("Artifact store error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid component ID: {0}")]
    ComponentId(#[from] ComponentIdError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Component {component_id} is {status}; only settled components can be reviewed")]
    NotReviewable {
        component_id: String,
        status: String,
    },

    #[error("Background task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for SpecforgeError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task(err.to_string())
    }
}

/// Trait for providing user-friendly error reporting with context and suggestions
pub trait UserFriendlyError {
    /// Get a user-friendly error message
    fn user_message(&self) -> String;

    /// Get contextual information about the error
    fn context(&self) -> Option<String>;

    /// Get suggested actions to resolve the error
    fn suggestions(&self) -> Vec<String>;

    /// Get the error category for grouping similar errors
    fn category(&self) -> ErrorCategory;
}

/// Categories of errors for better organization and handling
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Generation,
    FileSystem,
    Validation,
    Concurrency,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "Configuration"),
            Self::Generation => write!(f, "Generation"),
            Self::FileSystem => write!(f, "File System"),
            Self::Validation => write!(f, "Validation"),
            Self::Concurrency => write!(f, "Concurrency"),
        }
    }
}

/// Configuration and input-shape errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid configuration file: {0}")]
    InvalidFile(String),

    #[error("Invalid configuration value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration discovery failed: {reason}")]
    DiscoveryFailed { reason: String },

    #[error("Analysis of {component_id} asked for splitting but recommended no components")]
    EmptyRecommendation { component_id: String },

    #[error("Analysis of {component_id} recommended components without asking for splitting")]
    InconsistentAnalysis { component_id: String },

    #[error("Duplicate component ID in manifest: {id}")]
    DuplicateComponentId { id: String },
}

impl UserFriendlyError for ConfigError {
    fn user_message(&self) -> String {
        match self {
            Self::InvalidFile(reason) => format!("Configuration file is invalid: {reason}"),
            Self::InvalidValue { key, value } => {
                format!("Configuration '{key}' has invalid value: {value}")
            }
            Self::DiscoveryFailed { reason } => {
                format!("Failed to discover configuration: {reason}")
            }
            Self::EmptyRecommendation { component_id } => format!(
                "The analysis of '{component_id}' said it must be split but listed no components"
            ),
            Self::InconsistentAnalysis { component_id } => format!(
                "The analysis of '{component_id}' listed components but said no split was needed"
            ),
            Self::DuplicateComponentId { id } => {
                format!("Two components in the manifest share the ID '{id}'")
            }
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::InvalidFile(_) | Self::InvalidValue { .. } | Self::DiscoveryFailed { .. } => {
                Some("specforge reads .specforge/config.toml from the working directory upward, stopping at the repository root.".to_string())
            }
            Self::EmptyRecommendation { .. } | Self::InconsistentAnalysis { .. } => Some(
                "Analysis results are persisted and reused on resume, so a malformed one keeps failing until removed."
                    .to_string(),
            ),
            Self::DuplicateComponentId { .. } => Some(
                "Component IDs address artifacts and status records, so they must be unique across the whole decomposition tree."
                    .to_string(),
            ),
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::InvalidFile(_) => vec![
                "Check the TOML syntax of .specforge/config.toml".to_string(),
                "Compare with the [defaults] and [llm] sections in the documentation".to_string(),
            ],
            Self::InvalidValue { key, .. } => match key.as_str() {
                "max_depth" | "max_revisions" => {
                    vec!["Use a small non-negative integer (defaults are 3 and 2)".to_string()]
                }
                "concurrency" => vec!["Use 0 for unbounded, or a positive limit".to_string()],
                "provider" => vec!["Use 'anthropic'".to_string()],
                _ => vec!["Remove the option to use the default value".to_string()],
            },
            Self::DiscoveryFailed { .. } => vec![
                "Check read permissions on the working directory and its parents".to_string(),
                "Pass --config <path> to point at a configuration file directly".to_string(),
            ],
            Self::EmptyRecommendation { component_id }
            | Self::InconsistentAnalysis { component_id } => vec![format!(
                "Delete decomposition/{component_id}/analysis.json and re-run to analyze again"
            )],
            Self::DuplicateComponentId { id } => vec![
                format!("Rename one of the '{id}' specifications"),
                "Re-run with --fresh to discard the persisted decomposition".to_string(),
            ],
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Configuration
    }
}

/// Failures of the text-generation collaborator
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error(transparent)]
    Backend(#[from] LlmError),

    #[error("Malformed {task} response: {reason}")]
    MalformedResponse { task: String, reason: String },

    #[error("{task} expected a {expected} response but received {actual}")]
    UnexpectedShape {
        task: String,
        expected: String,
        actual: String,
    },

    #[error("Split response is missing child specification for {component_id}")]
    MissingChild { component_id: String },

    #[error("{0}")]
    Other(String),
}

impl UserFriendlyError for GenerationError {
    fn user_message(&self) -> String {
        match self {
            Self::Backend(err) => err.user_message(),
            other => other.to_string(),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::Backend(err) => err.context(),
            _ => Some(
                "The generation service answered, but not in the shape this step needs."
                    .to_string(),
            ),
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Backend(err) => err.suggestions(),
            _ => vec![
                "Re-run; completed steps are reused and only this step is retried".to_string(),
                "Try a more capable model with --model".to_string(),
            ],
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Generation
    }
}

/// LLM backend errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    /// Transport-level failure (HTTP connectivity, malformed body)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Provider authentication failure (401, 403, missing API key)
    #[error("Provider authentication error: {0}")]
    ProviderAuth(String),

    /// Provider quota/rate limit exceeded (429)
    #[error("Provider quota exceeded: {0}")]
    ProviderQuota(String),

    /// Provider service outage (5xx errors)
    #[error("Provider outage: {0}")]
    ProviderOutage(String),

    #[error("Timeout after {duration:?}")]
    Timeout { duration: Duration },

    #[error("Budget exceeded: attempted {attempted} calls, limit is {limit}")]
    BudgetExceeded { limit: u32, attempted: u32 },

    #[error("Misconfiguration: {0}")]
    Misconfiguration(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl UserFriendlyError for LlmError {
    fn user_message(&self) -> String {
        match self {
            Self::Transport(msg) => format!("LLM transport error: {msg}"),
            Self::ProviderAuth(msg) => format!("LLM provider authentication failed: {msg}"),
            Self::ProviderQuota(msg) => format!("LLM provider quota exceeded: {msg}"),
            Self::ProviderOutage(msg) => format!("LLM provider service outage: {msg}"),
            Self::Timeout { duration } => format!("LLM invocation timed out after {duration:?}"),
            Self::BudgetExceeded { limit, attempted } => {
                format!("LLM budget exceeded: attempted {attempted} calls, limit is {limit}")
            }
            Self::Misconfiguration(msg) => format!("LLM configuration error: {msg}"),
            Self::Unsupported(msg) => format!("LLM feature not supported: {msg}"),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::ProviderAuth(_) => Some(
                "Authentication errors indicate a missing or invalid API key.".to_string(),
            ),
            Self::ProviderQuota(_) | Self::ProviderOutage(_) | Self::Transport(_) => Some(
                "The provider could not serve the request; completed steps are kept on disk."
                    .to_string(),
            ),
            Self::Timeout { .. } => Some(
                "A single generation call took longer than the configured limit.".to_string(),
            ),
            Self::BudgetExceeded { .. } => {
                Some("The per-run call budget protects against runaway retries.".to_string())
            }
            Self::Misconfiguration(_) | Self::Unsupported(_) => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::ProviderAuth(_) => vec![
                "Export the API key named by [llm.anthropic] api_key_env (default ANTHROPIC_API_KEY)"
                    .to_string(),
            ],
            Self::ProviderQuota(_) => vec![
                "Lower --concurrency or raise --delay-ms".to_string(),
                "Wait and re-run; the run resumes from persisted artifacts".to_string(),
            ],
            Self::ProviderOutage(_) | Self::Transport(_) => {
                vec!["Re-run later; the run resumes from persisted artifacts".to_string()]
            }
            Self::Timeout { .. } => {
                vec!["Increase generation_timeout_secs in [defaults]".to_string()]
            }
            Self::BudgetExceeded { .. } => {
                vec!["Raise [llm] budget or re-run to continue from artifacts".to_string()]
            }
            Self::Misconfiguration(_) | Self::Unsupported(_) => {
                vec!["Check the [llm] section of .specforge/config.toml".to_string()]
            }
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Misconfiguration(_) | Self::Unsupported(_) => ErrorCategory::Configuration,
            _ => ErrorCategory::Generation,
        }
    }
}

/// Artifact store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Artifact not found: {key}")]
    NotFound { key: String },

    #[error("Invalid artifact key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("Failed to read artifact {key}: {source}")]
    Read {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write artifact {key}: {reason}")]
    Write { key: String, reason: String },

    #[error("Artifact {key} is not valid JSON for its record type: {reason}")]
    Decode { key: String, reason: String },
}

impl StoreError {
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl UserFriendlyError for SpecforgeError {
    fn user_message(&self) -> String {
        match self {
            Self::Config(err) => err.user_message(),
            Self::Generation {
                component_id,
                step,
                source,
            } => format!(
                "Generating {step} for '{component_id}' failed: {}",
                source.user_message()
            ),
            Self::ComponentId(err) => err.user_message(),
            other => other.to_string(),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::Config(err) => err.context(),
            Self::Generation { source, .. } => source.context(),
            Self::ComponentId(err) => err.context(),
            Self::ArtifactMissing { .. } => Some(
                "A step reported success but its artifact could not be read back.".to_string(),
            ),
            Self::InputMissing { .. } => {
                Some("The top-level specification must exist before a run starts.".to_string())
            }
            Self::Store(_) | Self::Io(_) => {
                Some("Artifacts are written atomically under the output directory.".to_string())
            }
            Self::NotReviewable { .. } => Some(
                "Review feedback is accepted once automatic processing has finished with the component."
                    .to_string(),
            ),
            Self::CycleDetected { .. } | Self::RecursionLimitExceeded { .. } | Self::Task(_) => {
                None
            }
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Config(err) => err.suggestions(),
            Self::Generation { source, .. } => source.suggestions(),
            Self::ComponentId(err) => err.suggestions(),
            Self::InputMissing { location } => vec![format!("Check that '{location}' exists")],
            Self::ArtifactMissing { .. } | Self::Store(_) | Self::Io(_) => vec![
                "Check free space and permissions in the output directory".to_string(),
            ],
            Self::CycleDetected { .. } => {
                vec!["Review the Dependencies sections of the listed components".to_string()]
            }
            Self::RecursionLimitExceeded { .. } => {
                vec!["Raise --max-depth if deeper decomposition is wanted".to_string()]
            }
            Self::NotReviewable { .. } => vec![
                "Run `specforge run` until the component is ready or needs review".to_string(),
                "Check progress with `specforge status`".to_string(),
            ],
            Self::Task(_) => vec![],
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Config(_) | Self::InputMissing { .. } | Self::NotReviewable { .. } => {
                ErrorCategory::Configuration
            }
            Self::Generation { .. } => ErrorCategory::Generation,
            Self::ComponentId(_) | Self::CycleDetected { .. } => ErrorCategory::Validation,
            Self::RecursionLimitExceeded { .. } => ErrorCategory::Validation,
            Self::ArtifactMissing { .. } | Self::Store(_) | Self::Io(_) => {
                ErrorCategory::FileSystem
            }
            Self::Task(_) => ErrorCategory::Concurrency,
        }
    }
}

impl SpecforgeError {
    /// Wrap a collaborator failure with the component and step it belongs to.
    pub fn generation(
        component_id: impl Into<String>,
        step: impl Into<String>,
        source: impl Into<GenerationError>,
    ) -> Self {
        Self::Generation {
            component_id: component_id.into(),
            step: step.into(),
            source: source.into(),
        }
    }

    /// Classify this error for the run summary.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_)
            | Self::ComponentId(_)
            | Self::InputMissing { .. }
            | Self::NotReviewable { .. } => ErrorKind::ConfigError,
            Self::Generation { .. } => ErrorKind::GenerationFailure,
            Self::ArtifactMissing { .. } => ErrorKind::ArtifactMissing,
            Self::CycleDetected { .. } => ErrorKind::CycleDetected,
            Self::RecursionLimitExceeded { .. } => ErrorKind::RecursionLimitExceeded,
            Self::Store(_) | Self::Io(_) => ErrorKind::Store,
            Self::Task(_) => ErrorKind::Internal,
        }
    }

    /// Get a user-friendly error message with context and actionable suggestions.
    #[must_use]
    pub fn display_for_user(&self) -> String {
        let mut output = format!("Error: {}\n", self.user_message());

        if let Some(ctx) = self.context() {
            output.push_str(&format!("\nContext: {ctx}\n"));
        }

        let suggestions = self.suggestions();
        if !suggestions.is_empty() {
            output.push_str("\nSuggestions:\n");
            for suggestion in suggestions {
                output.push_str(&format!("  • {suggestion}\n"));
            }
        }

        output
    }

    /// Map this error to the CLI exit code.
    #[must_use]
    pub fn to_exit_code(&self) -> crate::exit_codes::ExitCode {
        use crate::exit_codes::ExitCode;

        match self {
            Self::Config(_)
            | Self::ComponentId(_)
            | Self::InputMissing { .. }
            | Self::NotReviewable { .. } => ExitCode::CLI_ARGS,
            Self::Generation { source, .. } => match source {
                GenerationError::Backend(
                    LlmError::Misconfiguration(_) | LlmError::Unsupported(_),
                ) => ExitCode::CLI_ARGS,
                _ => ExitCode::GENERATION_FAILURE,
            },
            _ => ExitCode::INTERNAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exit_codes::ExitCode;

    #[test]
    fn generation_errors_carry_component_and_step() {
        let err = SpecforgeError::generation(
            "auth",
            "questions",
            LlmError::ProviderOutage("503".to_string()),
        );
        let text = err.to_string();
        assert!(text.contains("auth"));
        assert!(text.contains("questions"));
        assert_eq!(err.kind(), ErrorKind::GenerationFailure);
        assert_eq!(err.to_exit_code(), ExitCode::GENERATION_FAILURE);
    }

    #[test]
    fn misconfigured_backend_is_a_cli_error() {
        let err = SpecforgeError::generation(
            "auth",
            "analysis",
            LlmError::Misconfiguration("missing key".to_string()),
        );
        assert_eq!(err.to_exit_code(), ExitCode::CLI_ARGS);
    }

    #[test]
    fn kinds_cover_the_taxonomy() {
        assert_eq!(
            SpecforgeError::ArtifactMissing { key: "k".into() }.kind(),
            ErrorKind::ArtifactMissing
        );
        assert_eq!(
            SpecforgeError::CycleDetected {
                cycle: vec!["a".into(), "b".into(), "a".into()]
            }
            .kind(),
            ErrorKind::CycleDetected
        );
        assert_eq!(
            SpecforgeError::RecursionLimitExceeded {
                component_id: "x".into(),
                depth: 3,
                max_depth: 3
            }
            .kind(),
            ErrorKind::RecursionLimitExceeded
        );
        assert_eq!(
            SpecforgeError::from(ConfigError::DuplicateComponentId { id: "db".into() }).kind(),
            ErrorKind::ConfigError
        );
    }

    #[test]
    fn cycle_message_lists_the_path() {
        let err = SpecforgeError::CycleDetected {
            cycle: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "Dependency cycle detected: a -> b -> a");
    }

    #[test]
    fn display_for_user_includes_suggestions() {
        let err = SpecforgeError::InputMissing {
            location: "specs/root.md".to_string(),
        };
        let shown = err.display_for_user();
        assert!(shown.starts_with("Error: "));
        assert!(shown.contains("Context:"));
        assert!(shown.contains("specs/root.md"));
    }

    #[test]
    fn store_not_found_is_detectable() {
        let err = StoreError::NotFound {
            key: "manifest.json".into(),
        };
        assert!(err.is_not_found());
        assert!(
            !StoreError::Write {
                key: "k".into(),
                reason: "r".into()
            }
            .is_not_found()
        );
    }
}
