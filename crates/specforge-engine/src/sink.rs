//! Hand-off of ordered, ready components to a downstream generator.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use specforge_store::{ArtifactStore, ArtifactStoreExt, keys};
use specforge_utils::error::SpecforgeError;
use specforge_utils::types::{Component, ComponentId};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;

/// Receives ready components in generation order (dependencies first).
#[async_trait]
pub trait GenerationSink: Send + Sync {
    async fn accept(&self, ordered: &[Component]) -> Result<(), SpecforgeError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoffEntry {
    pub component_id: ComponentId,
    pub name: String,
    pub spec_reference: String,
    pub spec_hash: Option<String>,
    pub dependencies: BTreeSet<ComponentId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handoff {
    pub created_at: DateTime<Utc>,
    pub components: Vec<HandoffEntry>,
}

/// Default sink: writes `handoff.json` listing each component's final
/// specification in order.
pub struct ManifestSink {
    store: Arc<dyn ArtifactStore>,
}

impl ManifestSink {
    #[must_use]
    pub fn new(store: Arc<dyn ArtifactStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl GenerationSink for ManifestSink {
    async fn accept(&self, ordered: &[Component]) -> Result<(), SpecforgeError> {
        let components: Vec<HandoffEntry> = ordered
            .iter()
            .map(|c| HandoffEntry {
                component_id: c.component_id.clone(),
                name: c.name.clone(),
                spec_reference: c.spec_reference.clone(),
                spec_hash: c.spec_hash.clone(),
                dependencies: c.dependencies.clone(),
            })
            .collect();

        // Keep the previous timestamp when nothing changed so reruns are stable.
        let created_at = match self.store.get_json_opt::<Handoff>(keys::HANDOFF)? {
            Some(previous) if previous.components == components => previous.created_at,
            _ => Utc::now(),
        };
        let handoff = Handoff {
            created_at,
            components,
        };
        self.store.put_json(keys::HANDOFF, &handoff)?;
        info!(components = handoff.components.len(), "Wrote hand-off manifest");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use specforge_store::MemoryArtifactStore;

    #[tokio::test]
    async fn writes_components_in_given_order() {
        let store = Arc::new(MemoryArtifactStore::new());
        let sink = ManifestSink::new(Arc::clone(&store) as Arc<dyn ArtifactStore>);
        let ordered = vec![
            Component::new("db", "Database", "components/db/revised/r0.md"),
            Component::new("api", "Api", "components/api/revised/r0.md"),
        ];

        sink.accept(&ordered).await.unwrap();
        let first: Handoff = store.get_json(keys::HANDOFF).unwrap();
        let ids: Vec<_> = first.components.iter().map(|c| c.component_id.as_str()).collect();
        assert_eq!(ids, vec!["db", "api"]);

        sink.accept(&ordered).await.unwrap();
        let second: Handoff = store.get_json(keys::HANDOFF).unwrap();
        assert_eq!(first, second);
    }
}
