//! Test doubles: a scripted [`Generator`] and a store that loses writes.
//!
//! [`ScriptedGenerator`] answers every task deterministically from a small
//! script: which components split (and into what), how many evaluations fail
//! before one passes, which dependencies each child declares, and which calls
//! fail. Every call is recorded.

use async_trait::async_trait;
use serde_json::json;
use specforge_store::{ArtifactStore, MemoryArtifactStore};
use specforge_utils::error::{GenerationError, StoreError};
use specforge_utils::types::{AnalysisResult, RecommendedComponent};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::generation::{GenerationRequest, GenerationResponse, Generator, Task};

#[derive(Default)]
pub struct ScriptedGenerator {
    splits: HashMap<String, Vec<String>>,
    failing_evaluations: HashMap<String, u32>,
    dependencies: HashMap<String, Vec<String>>,
    failing_tasks: HashSet<(String, Task)>,
    delays: HashMap<String, Duration>,
    evaluations_seen: Mutex<HashMap<String, u32>>,
    calls: Mutex<Vec<(Task, String)>>,
}

impl ScriptedGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `id` needs splitting into `children`. Unscripted components are leaves.
    #[must_use]
    pub fn split(mut self, id: &str, children: &[&str]) -> Self {
        self.splits
            .insert(id.to_string(), children.iter().map(|c| (*c).to_string()).collect());
        self
    }

    /// The first `times` evaluations of `id` fail; `u32::MAX` fails forever.
    #[must_use]
    pub fn fail_evaluations(mut self, id: &str, times: u32) -> Self {
        self.failing_evaluations.insert(id.to_string(), times);
        self
    }

    /// Specifications written for `id` declare these dependencies.
    #[must_use]
    pub fn depends_on(mut self, id: &str, deps: &[&str]) -> Self {
        self.dependencies
            .insert(id.to_string(), deps.iter().map(|d| (*d).to_string()).collect());
        self
    }

    /// Every `task` request about `id` fails.
    #[must_use]
    pub fn fail_task(mut self, id: &str, task: Task) -> Self {
        self.failing_tasks.insert((id.to_string(), task));
        self
    }

    /// Requests about `id` take this long.
    #[must_use]
    pub fn delay(mut self, id: &str, delay: Duration) -> Self {
        self.delays.insert(id.to_string(), delay);
        self
    }

    pub fn calls(&self) -> Vec<(Task, String)> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn count(&self, task: Task) -> usize {
        self.calls().iter().filter(|(t, _)| *t == task).count()
    }

    pub fn count_for(&self, task: Task, id: &str) -> usize {
        self.calls()
            .iter()
            .filter(|(t, subject)| *t == task && subject == id)
            .count()
    }

    /// Specification text for a child, including its dependency section.
    fn child_spec(&self, parent: &str, child: &str) -> String {
        let mut spec = format!("# {child}\n\nComponent of {parent}.\n");
        if let Some(deps) = self.dependencies.get(child) {
            spec.push_str("\n## Dependencies\n\n");
            for dep in deps {
                spec.push_str(&format!("- `{dep}`\n"));
            }
        }
        spec
    }

    fn analysis(&self, id: &str) -> AnalysisResult {
        match self.splits.get(id) {
            Some(children) => AnalysisResult {
                needs_splitting: true,
                reasoning: format!("{id} has {} parts", children.len()),
                recommended_components: children
                    .iter()
                    .map(|c| RecommendedComponent {
                        component_id: c.clone(),
                        name: format!("{c} component"),
                        description: format!("The {c} part of {id}"),
                    })
                    .collect(),
            },
            None => AnalysisResult::leaf(format!("{id} is small enough")),
        }
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationResponse, GenerationError> {
        let id = request.subject.clone();
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((request.task, id.clone()));

        if let Some(delay) = self.delays.get(&id) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing_tasks.contains(&(id.clone(), request.task)) {
            return Err(GenerationError::Other(format!(
                "scripted {} failure for {id}",
                request.task
            )));
        }

        let response = match request.task {
            Task::Analyze => GenerationResponse::Structured(
                serde_json::to_value(self.analysis(&id))
                    .map_err(|e| GenerationError::Other(e.to_string()))?,
            ),
            Task::Split => {
                let children = self.splits.get(&id).cloned().unwrap_or_default();
                GenerationResponse::Files(
                    children
                        .iter()
                        .map(|child| (child.clone(), self.child_spec(&id, child)))
                        .collect::<BTreeMap<_, _>>(),
                )
            }
            Task::Questions => {
                GenerationResponse::Text(format!("1. What does {id} do when input is empty?\n"))
            }
            Task::AnswerAndRevise => {
                let mut files = BTreeMap::new();
                files.insert(
                    "answers".to_string(),
                    format!("1. {id} rejects empty input.\n"),
                );
                files.insert(
                    "revised".to_string(),
                    format!(
                        "{}\n\n> Clarified: {id} rejects empty input.\n",
                        request.content.trim_end()
                    ),
                );
                GenerationResponse::Files(files)
            }
            Task::Evaluate => {
                let seen = {
                    let mut counts = self
                        .evaluations_seen
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner);
                    let entry = counts.entry(id.clone()).or_insert(0);
                    *entry += 1;
                    *entry
                };
                let failures = self.failing_evaluations.get(&id).copied().unwrap_or(0);
                let passed = seen > failures;
                let (summary, issues) = if passed {
                    ("complete", Vec::new())
                } else {
                    ("gaps remain", vec![format!("{id} is vague")])
                };
                GenerationResponse::Structured(json!({
                    "passed": passed,
                    "summary": summary,
                    "issues": issues,
                }))
            }
        };
        Ok(response)
    }
}

/// Store whose writes under `prefix` succeed but never become visible to
/// `exists`. Everything else behaves like [`MemoryArtifactStore`].
pub struct LossyStore {
    inner: MemoryArtifactStore,
    prefix: String,
}

impl LossyStore {
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            inner: MemoryArtifactStore::new(),
            prefix: prefix.into(),
        }
    }
}

impl ArtifactStore for LossyStore {
    fn exists(&self, key: &str) -> Result<bool, StoreError> {
        if key.starts_with(&self.prefix) {
            return Ok(false);
        }
        self.inner.exists(key)
    }

    fn get(&self, key: &str) -> Result<String, StoreError> {
        self.inner.get(key)
    }

    fn put(&self, key: &str, content: &str) -> Result<(), StoreError> {
        self.inner.put(key, content)
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        self.inner.list(prefix)
    }
}
