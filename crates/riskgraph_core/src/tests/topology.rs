//! Tests for topological ordering and cycle handling
//!
//! These tests verify:
//! - Every DATA_FLOW edge points forward in the computed order
//! - FEEDBACK edges never count as dependencies
//! - Cyclic graphs are rejected before any node runs

use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use super::{graph_of, link, node, wire};
use crate::engine::execute_graph;
use crate::model::{AggregationMethod, EdgeKind, NodeKind, Value};
use crate::topology::{detect_cycle, has_cycle, topological_sort};
use crate::validation::{IssueKind, validate_graph};

/// Random DAGs: the order is a permutation with every edge pointing forward
#[test]
fn test_order_respects_every_edge() {
    for seed in 0..20 {
        let mut rng = SmallRng::seed_from_u64(seed);
        let count = 25;
        let ids: Vec<String> = (0..count).map(|i| format!("n{i}")).collect();

        let mut nodes: Vec<_> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| {
                if i == 0 {
                    node(id, NodeKind::constant(1.0))
                } else {
                    node(id, NodeKind::aggregator(AggregationMethod::Sum))
                }
            })
            .collect();
        nodes.shuffle(&mut rng);
        let mut graph = graph_of(nodes);

        for target in 1..count {
            let first = rng.random_range(0..target);
            let edge = link(&graph, &ids[first], "value", &ids[target], "values");
            graph = graph.add_edge(edge).unwrap();
            for source in 0..target {
                if source != first && rng.random_bool(0.15) {
                    let edge = link(&graph, &ids[source], "value", &ids[target], "values");
                    graph = graph.add_edge(edge).unwrap();
                }
            }
        }

        let order = topological_sort(&graph).expect("graph is acyclic");
        assert_eq!(order.len(), graph.nodes.len(), "order must contain every node");
        let position = |id: &crate::model::NodeId| order.iter().position(|n| &n.id == id).unwrap();
        for edge in graph.edges.iter().filter(|e| e.kind == EdgeKind::DataFlow) {
            assert!(
                position(&edge.source) < position(&edge.target),
                "seed {seed}: edge {} -> {} points backwards",
                edge.source,
                edge.target
            );
        }

        let result = execute_graph(&graph, &Value::Undefined, &mut rng);
        assert!(result.success, "seed {seed}: {:?}", result.error);
    }
}

/// A DATA_FLOW cycle yields no order and a failed execution mentioning "cycle"
#[test]
fn test_cycle_round_trip() {
    let graph = graph_of(vec![
        node("a", NodeKind::transformer("value + 1")),
        node("b", NodeKind::transformer("value + 1")),
        node("c", NodeKind::transformer("value + 1")),
    ]);
    let graph = wire(wire(wire(graph, "a", "b"), "b", "c"), "c", "a");

    assert!(topological_sort(&graph).is_none());
    assert!(has_cycle(&graph));
    let cycle = detect_cycle(&graph).expect("cycle members");
    assert_eq!(cycle.len(), 3);

    let result = execute_graph(&graph, &Value::Undefined, &mut SmallRng::seed_from_u64(0));
    assert!(!result.success);
    assert!(
        result.error.as_deref().unwrap_or_default().contains("cycle"),
        "error should mention the cycle: {:?}",
        result.error
    );
    assert!(result.node_values.is_empty(), "no node may run on a cyclic graph");

    let report = validate_graph(&graph);
    assert!(report.warnings.iter().any(|w| w.kind == IssueKind::Cycle));
}

/// Closing the same loop with a FEEDBACK edge keeps the graph sortable
#[test]
fn test_feedback_edge_breaks_cycle() {
    let graph = graph_of(vec![
        node("a", NodeKind::transformer("value + 1")),
        node("b", NodeKind::transformer("value * 2")),
    ]);
    let graph = wire(graph, "a", "b");
    let back = link(&graph, "b", "value", "a", "value")
        .feedback(1)
        .with_initial_value(0.0);
    let graph = graph.add_edge(back).unwrap();

    assert!(!has_cycle(&graph));
    let order: Vec<_> = topological_sort(&graph)
        .unwrap()
        .iter()
        .map(|n| n.id.to_string())
        .collect();
    assert_eq!(order, vec!["a", "b"]);
}
