//! Per-component finite-state pipeline.
//!
//! ```text
//! initial --questions--> questions_generated --answers+revise--> answers_generated
//! answers_generated --evaluate--> evaluated_pass --> ready
//!                             \--> evaluated_fail --(revision_count < max)--> questions_generated
//!                                                 \--> needs_human_review
//! ```
//!
//! Each transition writes its artifact, reads it back, and only then persists
//! the new status record. A step whose artifact already exists loads it
//! instead of calling the generator, so re-running a half-finished component
//! resumes at the first missing artifact.

use specforge_store::{ArtifactStore, ArtifactStoreExt, Revision, Step, keys};
use specforge_utils::canonicalization::content_hash;
use specforge_utils::error::{GenerationError, SpecforgeError};
use specforge_utils::logging::{component_span, log_step_complete, log_step_failed};
use specforge_utils::types::{Component, ComponentStatus};
use std::sync::Arc;
use tracing::{Instrument, debug, info};

use crate::generation::{
    Evaluation, GenerationRequest, GenerationResponse, Generator, GuidanceDocument, OutputShape,
    Task,
};
use crate::run_config::RunConfig;

const ANSWERS_FILE: &str = "answers";
const REVISED_FILE: &str = "revised";

#[derive(Clone)]
pub struct ComponentProcessor {
    store: Arc<dyn ArtifactStore>,
    generator: Arc<dyn Generator>,
    guidance: Arc<[GuidanceDocument]>,
    config: Arc<RunConfig>,
}

impl ComponentProcessor {
    #[must_use]
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        generator: Arc<dyn Generator>,
        guidance: Arc<[GuidanceDocument]>,
        config: Arc<RunConfig>,
    ) -> Self {
        Self {
            store,
            generator,
            guidance,
            config,
        }
    }

    /// Drive `component` until it is `ready` or `needs_human_review`.
    ///
    /// On error the last persisted status record is left as it was.
    pub async fn process(&self, component: Component) -> Result<Component, SpecforgeError> {
        let span = component_span(&component.component_id, component.revision_count);
        self.run_to_settled(component).instrument(span).await
    }

    async fn run_to_settled(&self, mut component: Component) -> Result<Component, SpecforgeError> {
        loop {
            debug!(status = %component.status, "Advancing component");
            component = match component.status {
                ComponentStatus::Ready | ComponentStatus::NeedsHumanReview => {
                    info!(
                        component_id = %component.component_id,
                        status = %component.status,
                        revision_count = component.revision_count,
                        "Component settled"
                    );
                    return Ok(component);
                }
                ComponentStatus::Initial => {
                    let revision = Revision::Auto(component.revision_count);
                    let next = self.ask_questions(component, revision).await?;
                    self.persist(next)?
                }
                ComponentStatus::QuestionsGenerated => {
                    let next = self.answer_and_revise(component).await?;
                    self.persist(next)?
                }
                ComponentStatus::AnswersGenerated => {
                    let next = self.evaluate(component).await?;
                    self.persist(next)?
                }
                ComponentStatus::EvaluatedPass => {
                    let mut next = component;
                    next.status = ComponentStatus::Ready;
                    self.persist(next)?
                }
                ComponentStatus::EvaluatedFail => {
                    let human_round = matches!(self.current_revision(&component), Revision::Human(_));
                    if !human_round && component.revision_count < self.config.max_revisions {
                        let mut next = component;
                        next.revision_count += 1;
                        let revision = Revision::Auto(next.revision_count);
                        let next = self.ask_questions(next, revision).await?;
                        self.persist(next)?
                    } else {
                        let mut next = component;
                        next.status = ComponentStatus::NeedsHumanReview;
                        self.persist(next)?
                    }
                }
            };
        }
    }

    /// Revision tag of the component's current specification: the human
    /// round when the current spec is a reviewer's edit, else the automatic
    /// round.
    #[must_use]
    pub fn current_revision(&self, component: &Component) -> Revision {
        let n = component.human_revision_count;
        if n > 0
            && component.spec_reference
                == keys::component_artifact(&component.component_id, Step::Spec, Revision::Human(n))
        {
            Revision::Human(n)
        } else {
            Revision::Auto(component.revision_count)
        }
    }

    async fn ask_questions(
        &self,
        mut component: Component,
        revision: Revision,
    ) -> Result<Component, SpecforgeError> {
        let id = component.component_id.clone();
        let key = keys::component_artifact(&id, Step::Questions, revision);

        if self.store.exists(&key)? {
            log_step_complete(&id, Step::Questions.as_str(), &key, true);
        } else {
            let spec = self.store.get(&component.spec_reference)?;
            let request = GenerationRequest::new(Task::Questions, id.clone(), spec, OutputShape::Text)
                .with_guidance(Arc::clone(&self.guidance));
            let questions = self
                .generate(&id, request)
                .await?
                .into_text(Task::Questions)
                .map_err(|e| self.failed(&id, Task::Questions, e))?;
            self.write(&key, &questions)?;
            log_step_complete(&id, Step::Questions.as_str(), &key, false);
        }

        component.questions_reference = Some(key);
        component.status = ComponentStatus::QuestionsGenerated;
        Ok(component)
    }

    async fn answer_and_revise(&self, mut component: Component) -> Result<Component, SpecforgeError> {
        let id = component.component_id.clone();
        let revision = self.current_revision(&component);
        let answers_key = keys::component_artifact(&id, Step::Answers, revision);
        let revised_key = keys::component_artifact(&id, Step::Revised, revision);

        let reused = self.store.exists(&answers_key)? && self.store.exists(&revised_key)?;
        if !reused {
            let spec = self.store.get(&component.spec_reference)?;
            let questions_key = component
                .questions_reference
                .clone()
                .unwrap_or_else(|| keys::component_artifact(&id, Step::Questions, revision));
            let questions = self.store.get(&questions_key)?;

            let request = GenerationRequest::new(
                Task::AnswerAndRevise,
                id.clone(),
                spec,
                OutputShape::Files {
                    names: vec![ANSWERS_FILE.to_string(), REVISED_FILE.to_string()],
                },
            )
            .with_input("Questions", questions)
            .with_guidance(Arc::clone(&self.guidance));

            let mut files = self
                .generate(&id, request)
                .await?
                .into_files(Task::AnswerAndRevise)
                .map_err(|e| self.failed(&id, Task::AnswerAndRevise, e))?;

            for (name, key) in [(ANSWERS_FILE, &answers_key), (REVISED_FILE, &revised_key)] {
                let content = files.remove(name).ok_or_else(|| {
                    self.failed(
                        &id,
                        Task::AnswerAndRevise,
                        GenerationError::MalformedResponse {
                            task: Task::AnswerAndRevise.to_string(),
                            reason: format!("no '{name}' section"),
                        },
                    )
                })?;
                // Both files come from this response, even when one survived
                // an interrupted earlier attempt.
                self.write(key, &content)?;
            }
        }
        log_step_complete(&id, Step::Answers.as_str(), &answers_key, reused);

        let revised = self.store.get(&revised_key)?;
        component.spec_hash = Some(content_hash(&revised));
        component.spec_reference = revised_key;
        component.answers_reference = Some(answers_key);
        component.status = ComponentStatus::AnswersGenerated;
        Ok(component)
    }

    async fn evaluate(&self, mut component: Component) -> Result<Component, SpecforgeError> {
        let id = component.component_id.clone();
        let key = keys::component_artifact(&id, Step::Evaluation, self.current_revision(&component));

        let (evaluation, reused) = match self.store.get_json_opt::<Evaluation>(&key)? {
            Some(evaluation) => (evaluation, true),
            None => {
                let spec = self.store.get(&component.spec_reference)?;
                let mut request = GenerationRequest::new(
                    Task::Evaluate,
                    id.clone(),
                    spec,
                    OutputShape::Structured {
                        schema: Evaluation::schema(),
                    },
                )
                .with_guidance(Arc::clone(&self.guidance));
                for (name, reference) in [
                    ("Questions", &component.questions_reference),
                    ("Answers", &component.answers_reference),
                ] {
                    if let Some(content) = reference
                        .as_deref()
                        .map(|key| self.store.get_opt(key))
                        .transpose()?
                        .flatten()
                    {
                        request = request.with_input(name, content);
                    }
                }

                let value = self
                    .generate(&id, request)
                    .await?
                    .into_structured(Task::Evaluate)
                    .map_err(|e| self.failed(&id, Task::Evaluate, e))?;
                let evaluation =
                    Evaluation::from_value(value).map_err(|e| self.failed(&id, Task::Evaluate, e))?;
                self.store.put_json(&key, &evaluation)?;
                self.verify(&key)?;
                (evaluation, false)
            }
        };
        log_step_complete(&id, Step::Evaluation.as_str(), &key, reused);
        info!(
            component_id = %id,
            revision_count = component.revision_count,
            passed = evaluation.passed,
            issues = evaluation.issues.len(),
            "Evaluation verdict"
        );

        component.evaluation_reference = Some(key);
        component.status = if evaluation.passed {
            ComponentStatus::EvaluatedPass
        } else {
            ComponentStatus::EvaluatedFail
        };
        Ok(component)
    }

    async fn generate(
        &self,
        component_id: &str,
        request: GenerationRequest,
    ) -> Result<GenerationResponse, SpecforgeError> {
        let task = request.task;
        self.generator
            .generate(request)
            .await
            .map_err(|e| self.failed(component_id, task, e))
    }

    fn failed(&self, component_id: &str, task: Task, source: GenerationError) -> SpecforgeError {
        let err = SpecforgeError::generation(component_id, task.as_str(), source);
        log_step_failed(component_id, task.as_str(), &err.to_string());
        err
    }

    fn write(&self, key: &str, content: &str) -> Result<(), SpecforgeError> {
        self.store.put(key, content)?;
        self.verify(key)
    }

    fn verify(&self, key: &str) -> Result<(), SpecforgeError> {
        if self.store.exists(key)? {
            Ok(())
        } else {
            Err(SpecforgeError::ArtifactMissing {
                key: key.to_string(),
            })
        }
    }

    /// Persist the status record after the transition's artifact is in place.
    fn persist(&self, component: Component) -> Result<Component, SpecforgeError> {
        self.store
            .put_json(&keys::status(&component.component_id), &component)?;
        Ok(component)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{LossyStore, ScriptedGenerator};
    use specforge_store::MemoryArtifactStore;

    fn seed(store: &MemoryArtifactStore, id: &str) -> Component {
        let key = keys::initial_spec(id);
        store.put(&key, &format!("# {id}\n")).unwrap();
        let component = Component::new(id, id, key);
        store.put_json(&keys::status(id), &component).unwrap();
        component
    }

    fn processor(
        store: &Arc<MemoryArtifactStore>,
        generator: &Arc<ScriptedGenerator>,
        max_revisions: u32,
    ) -> ComponentProcessor {
        ComponentProcessor::new(
            Arc::clone(store) as Arc<dyn ArtifactStore>,
            Arc::clone(generator) as Arc<dyn Generator>,
            Arc::from(Vec::new()),
            Arc::new(RunConfig {
                max_revisions,
                ..RunConfig::default()
            }),
        )
    }

    fn persisted(store: &MemoryArtifactStore, id: &str) -> Component {
        store.get_json(&keys::status(id)).unwrap()
    }

    #[tokio::test]
    async fn passing_component_becomes_ready() {
        let store = Arc::new(MemoryArtifactStore::new());
        let generator = Arc::new(ScriptedGenerator::new());
        let component = seed(&store, "db");

        let done = processor(&store, &generator, 2).process(component).await.unwrap();

        assert_eq!(done.status, ComponentStatus::Ready);
        assert_eq!(done.revision_count, 0);
        assert_eq!(done.spec_reference, "components/db/revised/r0.md");
        assert_eq!(persisted(&store, "db"), done);
        assert!(store.exists("components/db/evaluation/r0.json").unwrap());
        assert_eq!(generator.count(Task::Evaluate), 1);
    }

    #[tokio::test]
    async fn failed_evaluation_triggers_a_revision_round() {
        let store = Arc::new(MemoryArtifactStore::new());
        let generator = Arc::new(ScriptedGenerator::new().fail_evaluations("db", 1));
        let component = seed(&store, "db");

        let done = processor(&store, &generator, 2).process(component).await.unwrap();

        assert_eq!(done.status, ComponentStatus::Ready);
        assert_eq!(done.revision_count, 1);
        assert_eq!(generator.count(Task::Evaluate), 2);
        assert!(store.exists("components/db/questions/r1.md").unwrap());
        let revised = store.get(&done.spec_reference).unwrap();
        assert_eq!(done.spec_hash, Some(content_hash(&revised)));
    }

    #[tokio::test]
    async fn revision_budget_escalates_to_human_review() {
        let store = Arc::new(MemoryArtifactStore::new());
        let generator = Arc::new(ScriptedGenerator::new().fail_evaluations("db", u32::MAX));
        let component = seed(&store, "db");

        let done = processor(&store, &generator, 2).process(component).await.unwrap();

        assert_eq!(done.status, ComponentStatus::NeedsHumanReview);
        assert_eq!(done.revision_count, 2);
        assert_eq!(generator.count(Task::Evaluate), 3);
    }

    #[tokio::test]
    async fn zero_revisions_means_one_evaluation() {
        let store = Arc::new(MemoryArtifactStore::new());
        let generator = Arc::new(ScriptedGenerator::new().fail_evaluations("db", u32::MAX));
        let component = seed(&store, "db");

        let done = processor(&store, &generator, 0).process(component).await.unwrap();

        assert_eq!(done.status, ComponentStatus::NeedsHumanReview);
        assert_eq!(generator.count(Task::Evaluate), 1);
    }

    #[tokio::test]
    async fn generation_failure_leaves_status_untouched() {
        let store = Arc::new(MemoryArtifactStore::new());
        let generator = Arc::new(ScriptedGenerator::new().fail_task("db", Task::AnswerAndRevise));
        let component = seed(&store, "db");

        let err = processor(&store, &generator, 2).process(component).await.unwrap_err();

        assert!(matches!(err, SpecforgeError::Generation { ref step, .. } if step == "answers"));
        let record = persisted(&store, "db");
        assert_eq!(record.status, ComponentStatus::QuestionsGenerated);
        assert!(!store.exists("components/db/answers/r0.md").unwrap());
    }

    #[tokio::test]
    async fn existing_artifacts_are_reused_after_interruption() {
        let store = Arc::new(MemoryArtifactStore::new());
        let generator = Arc::new(ScriptedGenerator::new());
        let component = seed(&store, "db");
        // Questions written, but the run died before the status record moved.
        store.put("components/db/questions/r0.md", "1. Why?\n").unwrap();

        let done = processor(&store, &generator, 2).process(component).await.unwrap();

        assert_eq!(done.status, ComponentStatus::Ready);
        assert_eq!(generator.count(Task::Questions), 0);
        assert_eq!(store.get("components/db/questions/r0.md").unwrap(), "1. Why?\n");
    }

    #[tokio::test]
    async fn interrupted_revision_rewrites_answers_and_spec_together() {
        let store = Arc::new(MemoryArtifactStore::new());
        let generator = Arc::new(ScriptedGenerator::new());
        let component = seed(&store, "db");
        store.put("components/db/questions/r0.md", "1. Why?\n").unwrap();
        // Answers survived an earlier attempt; the revised spec did not.
        store.put("components/db/answers/r0.md", "stale answers\n").unwrap();

        let done = processor(&store, &generator, 2).process(component).await.unwrap();

        assert_eq!(done.status, ComponentStatus::Ready);
        assert_eq!(generator.count(Task::AnswerAndRevise), 1);
        assert_eq!(
            store.get("components/db/answers/r0.md").unwrap(),
            "1. db rejects empty input.\n"
        );
        assert!(store.get(&done.spec_reference).unwrap().contains("Clarified: db"));
    }

    #[tokio::test]
    async fn unverified_artifact_keeps_the_previous_status() {
        let store = Arc::new(LossyStore::new("components/db/questions/"));
        let generator = Arc::new(ScriptedGenerator::new());
        store.put(&keys::initial_spec("db"), "# db\n").unwrap();
        let component = Component::new("db", "db", keys::initial_spec("db"));
        store.put_json(&keys::status("db"), &component).unwrap();
        let processor = ComponentProcessor::new(
            Arc::clone(&store) as Arc<dyn ArtifactStore>,
            Arc::clone(&generator) as Arc<dyn Generator>,
            Arc::from(Vec::new()),
            Arc::new(RunConfig::default()),
        );

        let err = processor.process(component).await.unwrap_err();

        assert!(matches!(
            err,
            SpecforgeError::ArtifactMissing { ref key } if key == "components/db/questions/r0.md"
        ));
        let record: Component = store.get_json(&keys::status("db")).unwrap();
        assert_eq!(record.status, ComponentStatus::Initial);
        assert!(record.questions_reference.is_none());
    }

    #[tokio::test]
    async fn settled_component_makes_no_calls() {
        let store = Arc::new(MemoryArtifactStore::new());
        let generator = Arc::new(ScriptedGenerator::new());
        let mut component = seed(&store, "db");
        component.status = ComponentStatus::NeedsHumanReview;

        let done = processor(&store, &generator, 2).process(component).await.unwrap();
        assert_eq!(done.status, ComponentStatus::NeedsHumanReview);
        assert_eq!(generator.call_count(), 0);
    }
}
