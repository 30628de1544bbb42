//! `specforge order`

use anyhow::Result;
use std::sync::Arc;

use super::common::{open_store, print_json};
use crate::{ArtifactStore, Config, ExitCode, ManifestSink, order_from_store};

/// Recompute the generation order from the persisted status records.
///
/// Useful after `review submit` has made more components ready. Only the
/// dependency files and the hand-off are rewritten; the generator is never
/// called.
pub async fn execute_order_command(json: bool, config: &Config) -> Result<ExitCode> {
    let store: Arc<dyn ArtifactStore> = open_store(config)?;
    let sink = ManifestSink::new(Arc::clone(&store));
    let ordering = order_from_store(&store, &sink).await?;

    if json {
        print_json(&ordering)?;
        return Ok(ExitCode::SUCCESS);
    }

    if ordering.order.is_empty() {
        println!("No ready components to order");
        return Ok(ExitCode::SUCCESS);
    }
    println!("Generation order: {}", ordering.order.join(" -> "));
    for cycle in &ordering.graph.cycles {
        println!("  cycle: {}", cycle.join(" -> "));
    }
    for edge in &ordering.graph.pruned {
        println!("  dropped: {} -> {} (not ready)", edge.from, edge.to);
    }
    Ok(ExitCode::SUCCESS)
}
