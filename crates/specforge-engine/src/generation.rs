//! Contract with the text-generation collaborator
//!
//! Every expensive step (analysis, split, questions, answers, evaluation) is
//! a [`GenerationRequest`] sent to a [`Generator`]. The response declares its
//! shape: free text, a structured JSON value, or a named set of files.
//! [`LlmGenerator`] implements the contract over an [`LlmBackend`].

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use specforge_llm::{LlmBackend, LlmInvocation, Message};
use specforge_utils::error::GenerationError;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// The kind of work requested from the collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Task {
    Analyze,
    Split,
    Questions,
    AnswerAndRevise,
    Evaluate,
}

impl Task {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Analyze => "analysis",
            Self::Split => "split",
            Self::Questions => "questions",
            Self::AnswerAndRevise => "answers",
            Self::Evaluate => "evaluation",
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reference document passed to every request (style guide, glossary).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuidanceDocument {
    pub name: String,
    pub content: String,
}

/// Shape the response must take.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputShape {
    Text,
    /// A JSON object matching `schema`
    Structured { schema: Value },
    /// Files with exactly these names
    Files { names: Vec<String> },
}

impl OutputShape {
    const fn label(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Structured { .. } => "structured",
            Self::Files { .. } => "files",
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub task: Task,
    /// Component the request is about
    pub subject: String,
    /// Primary input, usually a specification
    pub content: String,
    /// Secondary named inputs (questions, answers, proposed components)
    pub inputs: BTreeMap<String, String>,
    pub guidance: Arc<[GuidanceDocument]>,
    pub output: OutputShape,
}

impl GenerationRequest {
    #[must_use]
    pub fn new(
        task: Task,
        subject: impl Into<String>,
        content: impl Into<String>,
        output: OutputShape,
    ) -> Self {
        Self {
            task,
            subject: subject.into(),
            content: content.into(),
            inputs: BTreeMap::new(),
            guidance: Arc::from(Vec::new()),
            output,
        }
    }

    #[must_use]
    pub fn with_input(mut self, name: impl Into<String>, content: impl Into<String>) -> Self {
        self.inputs.insert(name.into(), content.into());
        self
    }

    #[must_use]
    pub fn with_guidance(mut self, guidance: Arc<[GuidanceDocument]>) -> Self {
        self.guidance = guidance;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GenerationResponse {
    Text(String),
    Structured(Value),
    Files(BTreeMap<String, String>),
}

impl GenerationResponse {
    const fn label(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Structured(_) => "structured",
            Self::Files(_) => "files",
        }
    }

    fn unexpected(&self, task: Task, expected: &str) -> GenerationError {
        GenerationError::UnexpectedShape {
            task: task.to_string(),
            expected: expected.to_string(),
            actual: self.label().to_string(),
        }
    }

    pub fn into_text(self, task: Task) -> Result<String, GenerationError> {
        match self {
            Self::Text(text) => Ok(text),
            other => Err(other.unexpected(task, "text")),
        }
    }

    pub fn into_structured(self, task: Task) -> Result<Value, GenerationError> {
        match self {
            Self::Structured(value) => Ok(value),
            other => Err(other.unexpected(task, "structured")),
        }
    }

    pub fn into_files(self, task: Task) -> Result<BTreeMap<String, String>, GenerationError> {
        match self {
            Self::Files(files) => Ok(files),
            other => Err(other.unexpected(task, "files")),
        }
    }
}

/// The text-generation collaborator.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, request: GenerationRequest)
    -> Result<GenerationResponse, GenerationError>;
}

/// Verdict of an evaluation step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    pub passed: bool,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub issues: Vec<String>,
}

impl Evaluation {
    pub fn from_value(value: Value) -> Result<Self, GenerationError> {
        serde_json::from_value(value).map_err(|e| GenerationError::MalformedResponse {
            task: Task::Evaluate.to_string(),
            reason: e.to_string(),
        })
    }

    #[must_use]
    pub fn schema() -> Value {
        json!({
            "type": "object",
            "required": ["passed", "summary"],
            "properties": {
                "passed": {"type": "boolean"},
                "summary": {"type": "string"},
                "issues": {"type": "array", "items": {"type": "string"}}
            }
        })
    }
}

/// JSON schema of an analysis decision.
#[must_use]
pub fn analysis_schema() -> Value {
    json!({
        "type": "object",
        "required": ["needs_splitting", "reasoning", "recommended_components"],
        "properties": {
            "needs_splitting": {"type": "boolean"},
            "reasoning": {"type": "string"},
            "recommended_components": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["component_id", "name"],
                    "properties": {
                        "component_id": {"type": "string"},
                        "name": {"type": "string"},
                        "description": {"type": "string"}
                    }
                }
            }
        }
    })
}

/// [`Generator`] over an [`LlmBackend`].
///
/// Builds one system prompt per task and parses the reply into the requested
/// shape. Files are exchanged as `=== FILE: <name> ===` delimited sections.
pub struct LlmGenerator {
    backend: Arc<dyn LlmBackend>,
    model: String,
    timeout: Duration,
}

impl LlmGenerator {
    #[must_use]
    pub fn new(backend: Arc<dyn LlmBackend>, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            backend,
            model: model.into(),
            timeout,
        }
    }

    fn system_prompt(request: &GenerationRequest) -> String {
        let task = match request.task {
            Task::Analyze => {
                "Decide whether the specification below describes one coherent component \
                 that can be specified and built on its own, or whether it must be split \
                 into smaller components. Only recommend a split when the parts have \
                 separate responsibilities. Component IDs are short, lowercase, and use \
                 only letters, digits, '-', '_' and '.'."
            }
            Task::Split => {
                "Split the specification below into one self-contained specification per \
                 proposed component. Each child keeps every requirement of the parent that \
                 belongs to it. When a child relies on another child, list it under a \
                 '## Dependencies' heading using its component ID in backticks."
            }
            Task::Questions => {
                "List the questions an implementer would need answered before building \
                 the component below: ambiguities, missing edge cases, undefined terms, \
                 and unstated constraints. Number the questions."
            }
            Task::AnswerAndRevise => {
                "Answer each question about the specification below as a careful domain \
                 expert would, then rewrite the specification so that it incorporates the \
                 answers. Keep its '## Dependencies' section."
            }
            Task::Evaluate => {
                "Evaluate whether the specification below is complete, consistent and \
                 precise enough to implement without further clarification. Pass it only \
                 if no significant gaps remain."
            }
        };

        let format = match &request.output {
            OutputShape::Text => "Reply with Markdown only.".to_string(),
            OutputShape::Structured { schema } => format!(
                "Reply with a single JSON object, with no surrounding prose, matching this \
                 JSON schema:\n{schema}"
            ),
            OutputShape::Files { names } => format!(
                "Reply with one section per file. Start each section with a line of the \
                 form `=== FILE: <name> ===` and put the file's Markdown after it. The \
                 files are: {}.",
                names.join(", ")
            ),
        };

        format!("You are a specification engineer.\n\n{task}\n\n{format}")
    }

    fn user_prompt(request: &GenerationRequest) -> String {
        let mut prompt = String::new();
        for doc in request.guidance.iter() {
            prompt.push_str(&format!("# Guidance: {}\n\n{}\n\n", doc.name, doc.content.trim()));
        }
        prompt.push_str(&format!(
            "# Specification: {}\n\n{}\n",
            request.subject,
            request.content.trim()
        ));
        for (name, content) in &request.inputs {
            prompt.push_str(&format!("\n# {name}\n\n{}\n", content.trim()));
        }
        prompt
    }

    fn parse(request: &GenerationRequest, raw: &str) -> Result<GenerationResponse, GenerationError> {
        match &request.output {
            OutputShape::Text => Ok(GenerationResponse::Text(raw.trim().to_string())),
            OutputShape::Structured { .. } => {
                extract_json(raw).map(GenerationResponse::Structured).map_err(|reason| {
                    GenerationError::MalformedResponse {
                        task: request.task.to_string(),
                        reason,
                    }
                })
            }
            OutputShape::Files { .. } => {
                let files = split_files(raw);
                if files.is_empty() {
                    return Err(GenerationError::MalformedResponse {
                        task: request.task.to_string(),
                        reason: "no `=== FILE: <name> ===` sections found".to_string(),
                    });
                }
                Ok(GenerationResponse::Files(files))
            }
        }
    }
}

#[async_trait]
impl Generator for LlmGenerator {
    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationResponse, GenerationError> {
        let messages = vec![
            Message::system(Self::system_prompt(&request)),
            Message::user(Self::user_prompt(&request)),
        ];
        let invocation = LlmInvocation::new(
            request.subject.clone(),
            request.task.as_str(),
            self.model.clone(),
            self.timeout,
            messages,
        );

        let result = self.backend.invoke(invocation).await?;
        debug!(
            component_id = %request.subject,
            task = %request.task,
            shape = request.output.label(),
            model = %result.model_used,
            "Generation response received"
        );
        if result.was_truncated() {
            return Err(GenerationError::MalformedResponse {
                task: request.task.to_string(),
                reason: "response was cut off at the token limit".to_string(),
            });
        }
        Self::parse(&request, &result.raw_response)
    }
}

static FENCED_JSON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json)?\s*\n(.*?)\n\s*```").unwrap());

static FILE_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^=== FILE: *(.+?) *===\s*$").unwrap());

/// Pull a JSON object out of a reply: a fenced block if present, otherwise
/// the outermost braces.
fn extract_json(raw: &str) -> Result<Value, String> {
    let candidate = if let Some(caps) = FENCED_JSON.captures(raw)
        && let Some(body) = caps.get(1)
    {
        body.as_str()
    } else {
        match (raw.find('{'), raw.rfind('}')) {
            (Some(start), Some(end)) if start < end => &raw[start..=end],
            _ => return Err("no JSON object in response".to_string()),
        }
    };
    serde_json::from_str(candidate).map_err(|e| e.to_string())
}

fn split_files(raw: &str) -> BTreeMap<String, String> {
    let markers: Vec<_> = FILE_MARKER.captures_iter(raw).collect();
    let mut files = BTreeMap::new();
    for (i, caps) in markers.iter().enumerate() {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let end = markers
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map_or(raw.len(), |m| m.start());
        let body = raw[whole.end()..end].trim();
        files.insert(name.as_str().trim().to_string(), format!("{body}\n"));
    }
    files
}
