use specforge_utils::component_id::sanitize_component_id;
use specforge_utils::error::{GenerationError, SpecforgeError};
use specforge_utils::types::{AnalysisResult, Specification};
use std::sync::Arc;
use tracing::debug;

use crate::generation::{
    GenerationRequest, Generator, GuidanceDocument, OutputShape, Task, analysis_schema,
};

/// Asks the generator whether a specification must be split.
#[derive(Clone)]
pub struct Analyzer {
    generator: Arc<dyn Generator>,
    guidance: Arc<[GuidanceDocument]>,
}

impl Analyzer {
    #[must_use]
    pub fn new(generator: Arc<dyn Generator>, guidance: Arc<[GuidanceDocument]>) -> Self {
        Self {
            generator,
            guidance,
        }
    }

    /// Analyze `spec`. Recommended component IDs come back sanitized.
    ///
    /// The shape invariants are not checked here: the caller persists the
    /// raw decision first and validates it afterwards.
    pub async fn analyze(&self, spec: &Specification) -> Result<AnalysisResult, SpecforgeError> {
        let request = GenerationRequest::new(
            Task::Analyze,
            spec.id.clone(),
            spec.content.clone(),
            OutputShape::Structured {
                schema: analysis_schema(),
            },
        )
        .with_guidance(Arc::clone(&self.guidance));

        let value = self
            .generator
            .generate(request)
            .await
            .and_then(|response| response.into_structured(Task::Analyze))
            .map_err(|e| SpecforgeError::generation(&spec.id, Task::Analyze.as_str(), e))?;

        let mut analysis: AnalysisResult = serde_json::from_value(value).map_err(|e| {
            SpecforgeError::generation(
                &spec.id,
                Task::Analyze.as_str(),
                GenerationError::MalformedResponse {
                    task: Task::Analyze.to_string(),
                    reason: e.to_string(),
                },
            )
        })?;

        for recommended in &mut analysis.recommended_components {
            recommended.component_id = sanitize_component_id(&recommended.component_id)?;
        }

        debug!(
            component_id = %spec.id,
            needs_splitting = analysis.needs_splitting,
            recommended = analysis.recommended_components.len(),
            "Analysis complete"
        );
        Ok(analysis)
    }
}
