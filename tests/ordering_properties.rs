//! Properties of dependency ordering and batch execution.

use proptest::prelude::*;
use specforge::{BatchOptions, BatchRunner, SpecforgeError, topo_order};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

fn graph(edges: &[(&str, &[&str])]) -> BTreeMap<String, BTreeSet<String>> {
    edges
        .iter()
        .map(|(id, deps)| {
            (
                (*id).to_string(),
                deps.iter().map(|d| (*d).to_string()).collect(),
            )
        })
        .collect()
}

fn position(order: &[String], id: &str) -> usize {
    order.iter().position(|o| o == id).unwrap()
}

/// Random DAG over `n0..n{size}`: edges only point at lower-numbered nodes.
fn dag() -> impl Strategy<Value = BTreeMap<String, BTreeSet<String>>> {
    (1usize..12).prop_flat_map(|size| {
        prop::collection::vec(prop::collection::vec(any::<bool>(), size), size).prop_map(
            move |matrix| {
                (0..size)
                    .map(|i| {
                        let deps = (0..i)
                            .filter(|&j| matrix[i][j])
                            .map(|j| format!("n{j}"))
                            .collect();
                        (format!("n{i}"), deps)
                    })
                    .collect()
            },
        )
    })
}

/// Arbitrary directed graph over `n0..n{size}`, cycles and self loops allowed.
fn any_graph() -> impl Strategy<Value = BTreeMap<String, BTreeSet<String>>> {
    (1usize..10).prop_flat_map(|size| {
        prop::collection::vec(prop::collection::vec(any::<bool>(), size), size).prop_map(
            move |matrix| {
                (0..size)
                    .map(|i| {
                        let deps = (0..size)
                            .filter(|&j| matrix[i][j])
                            .map(|j| format!("n{j}"))
                            .collect();
                        (format!("n{i}"), deps)
                    })
                    .collect()
            },
        )
    })
}

#[test]
fn three_node_chain_orders_dependencies_first() {
    let result = topo_order(&graph(&[("a", &[]), ("b", &["a"]), ("c", &["a", "b"])]));
    assert_eq!(result.order, vec!["a", "b", "c"]);
    assert!(result.cycles.is_empty());
}

#[test]
fn two_cycle_still_yields_both_nodes() {
    let result = topo_order(&graph(&[("a", &["b"]), ("b", &["a"])]));
    let mut sorted = result.order.clone();
    sorted.sort();
    assert_eq!(sorted, vec!["a", "b"]);
    assert_eq!(result.cycles.len(), 1);
}

proptest! {
    #[test]
    fn acyclic_order_respects_every_edge(edges in dag()) {
        let result = topo_order(&edges);
        prop_assert!(result.cycles.is_empty());
        prop_assert_eq!(result.order.len(), edges.len());
        for (id, deps) in &edges {
            for dep in deps {
                prop_assert!(position(&result.order, dep) < position(&result.order, id));
            }
        }
    }

    #[test]
    fn cyclic_graphs_yield_a_permutation(edges in any_graph()) {
        let result = topo_order(&edges);
        let ordered: BTreeSet<&String> = result.order.iter().collect();
        prop_assert_eq!(ordered.len(), result.order.len());
        prop_assert_eq!(ordered, edges.keys().collect::<BTreeSet<_>>());
    }

    #[test]
    fn batch_results_follow_input_order(
        delays in prop::collection::vec(0u64..15, 1..8),
        max_concurrency in 0usize..4,
    ) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let runner = BatchRunner::new(BatchOptions {
            max_concurrency,
            ..BatchOptions::default()
        });
        let items: Vec<(usize, u64)> = delays.iter().copied().enumerate().collect();

        let results = rt
            .block_on(runner.run(items, |(index, delay)| async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                Ok::<_, SpecforgeError>(index)
            }))
            .unwrap();

        let indices: Vec<usize> = results.into_iter().map(Result::unwrap).collect();
        prop_assert_eq!(indices, (0..delays.len()).collect::<Vec<_>>());
    }
}

#[tokio::test]
async fn slow_first_item_keeps_its_place() {
    let runner = BatchRunner::new(BatchOptions {
        max_concurrency: 2,
        ..BatchOptions::default()
    });
    let results = runner
        .run(vec![("A", 80u64), ("B", 0)], |(name, delay)| async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok::<_, SpecforgeError>(format!("result{name}"))
        })
        .await
        .unwrap();

    let values: Vec<String> = results.into_iter().map(Result::unwrap).collect();
    assert_eq!(values, vec!["resultA", "resultB"]);
}
