//! Human review hand-off.
//!
//! Components that exhaust their automatic revision budget are copied into
//! `review/<id>/` with instructions. A reviewer's edited specification comes
//! back through [`ReviewManager::process_feedback`], is stored as the next
//! human revision (`spec/h<n>.md`) and is evaluated by the processor.

use serde::Serialize;
use specforge_store::{ArtifactStore, ArtifactStoreExt, Revision, Step, keys};
use specforge_utils::canonicalization::content_hash;
use specforge_utils::error::SpecforgeError;
use specforge_utils::types::{Component, ComponentStatus};
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::info;

use crate::generation::Evaluation;
use crate::processor::ComponentProcessor;

pub const INSTRUCTIONS_FILE: &str = "INSTRUCTIONS.md";

/// Files copied for one component's review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewBundle {
    pub component_id: String,
    /// Store key of the review directory
    pub directory: String,
    /// Store keys of the files in the bundle, instructions last
    pub files: Vec<String>,
}

#[derive(Clone)]
pub struct ReviewManager {
    store: Arc<dyn ArtifactStore>,
    processor: ComponentProcessor,
}

impl ReviewManager {
    #[must_use]
    pub fn new(store: Arc<dyn ArtifactStore>, processor: ComponentProcessor) -> Self {
        Self { store, processor }
    }

    /// Copy the component's current artifacts into its review directory.
    /// The status record is not touched.
    pub fn prepare_for_review(&self, component: &Component) -> Result<ReviewBundle, SpecforgeError> {
        prepare_bundle(self.store.as_ref(), component)
    }

    /// Store `edited` as the component's next human revision and evaluate it.
    ///
    /// Only settled components accept feedback. The automatic revision count
    /// is kept; the human revision count goes up by one. On error the status
    /// record is unchanged.
    pub async fn process_feedback(
        &self,
        component_id: &str,
        edited: &str,
    ) -> Result<Component, SpecforgeError> {
        let mut component: Component = self.store.get_json(&keys::status(component_id))?;
        if !component.status.is_settled() {
            return Err(SpecforgeError::NotReviewable {
                component_id: component_id.to_string(),
                status: component.status.to_string(),
            });
        }

        let round = component.human_revision_count + 1;
        let key = keys::component_artifact(component_id, Step::Spec, Revision::Human(round));
        let hash = content_hash(edited);
        let unchanged = self
            .store
            .get_opt(&key)?
            .is_some_and(|existing| content_hash(&existing) == hash);
        if !unchanged {
            self.store.put(&key, edited)?;
        }
        if !self.store.exists(&key)? {
            return Err(SpecforgeError::ArtifactMissing { key });
        }

        info!(
            component_id = %component_id,
            human_revision = round,
            revision_count = component.revision_count,
            "Accepted reviewed specification"
        );
        component.spec_reference = key;
        component.spec_hash = Some(hash);
        component.human_revision_count = round;
        component.evaluation_reference = None;
        component.status = ComponentStatus::AnswersGenerated;

        // The record is first written by the evaluation step, so a failed
        // evaluation leaves the component settled and open to resubmission.
        self.processor.process(component).await
    }
}

/// Write the review bundle for `component`. Needs only the store, so it is
/// usable without a generator.
pub fn prepare_bundle(
    store: &dyn ArtifactStore,
    component: &Component,
) -> Result<ReviewBundle, SpecforgeError> {
    let id = &component.component_id;
    let mut files = Vec::new();

    let sources = [
        ("spec.md", Some(&component.spec_reference)),
        ("questions.md", component.questions_reference.as_ref()),
        ("answers.md", component.answers_reference.as_ref()),
        ("evaluation.json", component.evaluation_reference.as_ref()),
    ];
    for (name, source) in sources {
        let Some(source) = source else { continue };
        let Some(content) = store.get_opt(source)? else {
            continue;
        };
        let key = keys::review_file(id, name);
        put_if_changed(store, &key, &content)?;
        files.push(key);
    }

    let evaluation = component
        .evaluation_reference
        .as_deref()
        .map(|key| store.get_json_opt::<Evaluation>(key))
        .transpose()?
        .flatten();
    let key = keys::review_file(id, INSTRUCTIONS_FILE);
    put_if_changed(store, &key, &instructions(component, evaluation.as_ref()))?;
    files.push(key);

    info!(
        component_id = %id,
        files = files.len(),
        "Review bundle prepared"
    );
    Ok(ReviewBundle {
        component_id: id.clone(),
        directory: keys::review_dir(id),
        files,
    })
}

fn put_if_changed(store: &dyn ArtifactStore, key: &str, content: &str) -> Result<(), SpecforgeError> {
    if store.get_opt(key)?.as_deref() != Some(content) {
        store.put(key, content)?;
    }
    Ok(())
}

fn instructions(component: &Component, evaluation: Option<&Evaluation>) -> String {
    let id = &component.component_id;
    let mut out = format!("# Review: {}\n\n", component.name);
    let _ = writeln!(
        out,
        "`{id}` did not pass evaluation after {} automatic revision(s){}.\n",
        component.revision_count,
        if component.human_revision_count > 0 {
            format!(" and {} human revision(s)", component.human_revision_count)
        } else {
            String::new()
        }
    );
    if let Some(evaluation) = evaluation {
        let _ = writeln!(out, "## Latest evaluation\n\n{}\n", evaluation.summary);
        for issue in &evaluation.issues {
            let _ = writeln!(out, "- {issue}");
        }
        if !evaluation.issues.is_empty() {
            out.push('\n');
        }
    }
    let _ = writeln!(
        out,
        "## Next steps\n\n\
         1. Edit a copy of `spec.md`, using `questions.md` and `answers.md` as context.\n\
         2. Submit it for evaluation:\n\n   \
         specforge review submit {id} --file <edited.md> --out <output dir>"
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::{Generator, Task};
    use crate::run_config::RunConfig;
    use crate::test_support::{LossyStore, ScriptedGenerator};
    use specforge_store::MemoryArtifactStore;

    async fn stalled(
        generator: ScriptedGenerator,
    ) -> (Arc<MemoryArtifactStore>, Arc<ScriptedGenerator>, ReviewManager, Component) {
        let store = Arc::new(MemoryArtifactStore::new());
        let generator = Arc::new(generator);
        store.put(&keys::initial_spec("db"), "# db\n").unwrap();
        let processor = ComponentProcessor::new(
            Arc::clone(&store) as Arc<dyn ArtifactStore>,
            Arc::clone(&generator) as Arc<dyn Generator>,
            Arc::from(Vec::new()),
            Arc::new(RunConfig {
                max_revisions: 1,
                ..RunConfig::default()
            }),
        );
        let component = processor
            .process(Component::new("db", "Database", keys::initial_spec("db")))
            .await
            .unwrap();
        let manager = ReviewManager::new(Arc::clone(&store) as Arc<dyn ArtifactStore>, processor);
        (store, generator, manager, component)
    }

    #[tokio::test]
    async fn bundle_contains_current_artifacts() {
        let (store, _, manager, component) =
            stalled(ScriptedGenerator::new().fail_evaluations("db", u32::MAX)).await;
        assert_eq!(component.status, ComponentStatus::NeedsHumanReview);

        let bundle = manager.prepare_for_review(&component).unwrap();
        let names: Vec<_> = bundle
            .files
            .iter()
            .map(|f| f.rsplit('/').next().unwrap())
            .collect();
        assert_eq!(
            names,
            vec!["spec.md", "questions.md", "answers.md", "evaluation.json", INSTRUCTIONS_FILE]
        );
        let instructions = store.get("review/db/INSTRUCTIONS.md").unwrap();
        assert!(instructions.contains("specforge review submit db"));
        assert!(instructions.contains("db is vague"));

        let record: Component = store.get_json(&keys::status("db")).unwrap();
        assert_eq!(record.status, ComponentStatus::NeedsHumanReview);
    }

    #[tokio::test]
    async fn accepted_edit_becomes_ready() {
        let (store, generator, manager, component) =
            stalled(ScriptedGenerator::new().fail_evaluations("db", 2)).await;
        assert_eq!(component.status, ComponentStatus::NeedsHumanReview);

        let done = manager
            .process_feedback("db", "# db\n\nFully specified.\n")
            .await
            .unwrap();

        assert_eq!(done.status, ComponentStatus::Ready);
        assert_eq!(done.human_revision_count, 1);
        assert_eq!(done.revision_count, 1);
        assert_eq!(done.spec_reference, "components/db/spec/h1.md");
        assert!(store.exists("components/db/evaluation/h1.json").unwrap());
        assert_eq!(generator.count(Task::Evaluate), 3);
        assert_eq!(generator.count(Task::Questions), 2);
    }

    #[tokio::test]
    async fn rejected_edit_returns_to_review() {
        let (_, _, manager, _) =
            stalled(ScriptedGenerator::new().fail_evaluations("db", u32::MAX)).await;

        let first = manager.process_feedback("db", "# db v2\n").await.unwrap();
        assert_eq!(first.status, ComponentStatus::NeedsHumanReview);
        let second = manager.process_feedback("db", "# db v3\n").await.unwrap();
        assert_eq!(second.human_revision_count, 2);
        assert_eq!(second.revision_count, 1);
        assert_eq!(second.spec_reference, "components/db/spec/h2.md");
    }

    #[tokio::test]
    async fn failed_evaluation_of_an_edit_allows_resubmission() {
        let (store, _, _, _) =
            stalled(ScriptedGenerator::new().fail_evaluations("db", u32::MAX)).await;
        let manager_with = |generator: ScriptedGenerator| {
            let processor = ComponentProcessor::new(
                Arc::clone(&store) as Arc<dyn ArtifactStore>,
                Arc::new(generator),
                Arc::from(Vec::new()),
                Arc::new(RunConfig {
                    max_revisions: 1,
                    ..RunConfig::default()
                }),
            );
            ReviewManager::new(Arc::clone(&store) as Arc<dyn ArtifactStore>, processor)
        };

        let err = manager_with(ScriptedGenerator::new().fail_task("db", Task::Evaluate))
            .process_feedback("db", "# db v2\n")
            .await
            .unwrap_err();
        assert!(matches!(err, SpecforgeError::Generation { .. }));
        let record: Component = store.get_json(&keys::status("db")).unwrap();
        assert_eq!(record.status, ComponentStatus::NeedsHumanReview);
        assert_eq!(record.human_revision_count, 0);

        let done = manager_with(ScriptedGenerator::new())
            .process_feedback("db", "# db v2\n")
            .await
            .unwrap();
        assert_eq!(done.status, ComponentStatus::Ready);
        assert_eq!(done.human_revision_count, 1);
        assert_eq!(done.spec_reference, "components/db/spec/h1.md");
    }

    #[tokio::test]
    async fn unverified_edit_keeps_the_component_in_review() {
        let store = Arc::new(LossyStore::new("components/db/spec/h"));
        store.put(&keys::initial_spec("db"), "# db\n").unwrap();
        let processor = ComponentProcessor::new(
            Arc::clone(&store) as Arc<dyn ArtifactStore>,
            Arc::new(ScriptedGenerator::new().fail_evaluations("db", u32::MAX)),
            Arc::from(Vec::new()),
            Arc::new(RunConfig {
                max_revisions: 0,
                ..RunConfig::default()
            }),
        );
        let stalled = processor
            .process(Component::new("db", "Database", keys::initial_spec("db")))
            .await
            .unwrap();
        assert_eq!(stalled.status, ComponentStatus::NeedsHumanReview);
        let manager = ReviewManager::new(Arc::clone(&store) as Arc<dyn ArtifactStore>, processor);

        let err = manager.process_feedback("db", "# db v2\n").await.unwrap_err();

        assert!(matches!(
            err,
            SpecforgeError::ArtifactMissing { ref key } if key == "components/db/spec/h1.md"
        ));
        let record: Component = store.get_json(&keys::status("db")).unwrap();
        assert_eq!(record, stalled);
    }

    #[tokio::test]
    async fn unsettled_component_is_not_reviewable() {
        let store = Arc::new(MemoryArtifactStore::new());
        let component = Component::new("db", "Database", keys::initial_spec("db"));
        store.put_json(&keys::status("db"), &component).unwrap();
        let processor = ComponentProcessor::new(
            Arc::clone(&store) as Arc<dyn ArtifactStore>,
            Arc::new(ScriptedGenerator::new()),
            Arc::from(Vec::new()),
            Arc::new(RunConfig::default()),
        );
        let manager = ReviewManager::new(store, processor);

        let err = manager.process_feedback("db", "# edit").await.unwrap_err();
        assert!(matches!(err, SpecforgeError::NotReviewable { .. }));
    }
}
