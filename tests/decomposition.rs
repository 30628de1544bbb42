//! Decomposition over the in-memory store: reuse on rerun, the depth bound,
//! and the two-child split.

use proptest::prelude::*;
use specforge::types::Specification;
use specforge::{
    ArtifactStore, BatchOptions, Decomposer, Generator, MemoryArtifactStore, RunConfig, Task, keys,
};
use specforge_engine::test_support::ScriptedGenerator;
use std::sync::Arc;

fn seed_root(store: &MemoryArtifactStore, id: &str) -> Specification {
    let location = keys::initial_spec(id);
    let content = format!("# {id}\n");
    store.put(&location, &content).unwrap();
    Specification {
        id: id.to_string(),
        location,
        content,
    }
}

fn decomposer(
    store: &Arc<MemoryArtifactStore>,
    generator: &Arc<ScriptedGenerator>,
    max_depth: usize,
) -> Decomposer {
    Decomposer::new(
        Arc::clone(store) as Arc<dyn ArtifactStore>,
        Arc::clone(generator) as Arc<dyn Generator>,
        Arc::from(Vec::new()),
        Arc::new(RunConfig {
            max_depth,
            batch: BatchOptions {
                max_concurrency: 3,
                ..BatchOptions::default()
            },
            ..RunConfig::default()
        }),
    )
}

/// Every node of a complete tree of the given height splits into `branching`
/// children named `<parent>-<i>`.
fn splitting_tree(height: usize, branching: usize) -> ScriptedGenerator {
    let mut generator = ScriptedGenerator::new();
    let mut level = vec!["root".to_string()];
    for _ in 0..height {
        let mut next = Vec::new();
        for parent in &level {
            let children: Vec<String> = (0..branching).map(|i| format!("{parent}-{i}")).collect();
            let refs: Vec<&str> = children.iter().map(String::as_str).collect();
            generator = generator.split(parent, &refs);
            next.extend(children);
        }
        level = next;
    }
    generator
}

#[tokio::test]
async fn two_child_split_at_depth_one() {
    let store = Arc::new(MemoryArtifactStore::new());
    let generator = Arc::new(ScriptedGenerator::new().split("s", &["c1", "c2"]));

    let result = decomposer(&store, &generator, 1)
        .decompose(seed_root(&store, "s"), "S")
        .await
        .unwrap();

    let ids: Vec<&str> = result
        .entries
        .iter()
        .map(|e| e.component_id.as_str())
        .collect();
    assert_eq!(ids, vec!["c1", "c2"]);
    assert!(result.entries.iter().all(|e| e.depth == 1));
    assert!(result.entries.iter().all(|e| e.parent.as_deref() == Some("s")));
    assert_eq!(result.manifest(1).components.len(), 2);
}

#[tokio::test]
async fn rerun_reuses_every_analysis() {
    let store = Arc::new(MemoryArtifactStore::new());
    let generator = Arc::new(
        ScriptedGenerator::new()
            .split("s", &["api", "data"])
            .split("data", &["cache", "db"]),
    );

    let first = decomposer(&store, &generator, 3)
        .decompose(seed_root(&store, "s"), "S")
        .await
        .unwrap();
    let analyses = generator.count(Task::Analyze);
    let splits = generator.count(Task::Split);
    assert_eq!(analyses, 5);

    let second = decomposer(&store, &generator, 3)
        .decompose(seed_root(&store, "s"), "S")
        .await
        .unwrap();

    assert_eq!(generator.count(Task::Analyze), analyses);
    assert_eq!(generator.count(Task::Split), splits);
    assert_eq!(first.manifest(3), second.manifest(3));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn depth_never_exceeds_the_limit(
        height in 0usize..4,
        branching in 1usize..3,
        max_depth in 0usize..4,
    ) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let store = Arc::new(MemoryArtifactStore::new());
        let generator = Arc::new(splitting_tree(height, branching));

        let result = rt
            .block_on(
                decomposer(&store, &generator, max_depth).decompose(seed_root(&store, "root"), "Root"),
            )
            .unwrap();

        let expected_depth = height.min(max_depth);
        prop_assert_eq!(result.max_depth_reached, expected_depth);
        prop_assert!(result.entries.iter().all(|e| e.depth == expected_depth));
        prop_assert_eq!(result.entries.len(), branching.pow(u32::try_from(expected_depth).unwrap()));
        // Nothing below the limit is ever analyzed.
        for (_, subject) in generator.calls() {
            prop_assert!(subject.matches('-').count() <= max_depth);
        }
    }
}
