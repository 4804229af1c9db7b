//! Tests for the Monte Carlo driver
//!
//! These tests verify:
//! - Sample statistics converge on the configured distribution
//! - A fixed seed reproduces every sample bit-for-bit
//! - Parallel and sequential runs agree
//! - Cancellation and time budgets stop early with partial results

use super::{graph_of, node, wire};
use crate::config::SimulationConfig;
use crate::model::{DistributionSpec, Graph, NodeKind};
use crate::simulation::{SimulationProgress, run_monte_carlo_simulation};

fn demand_graph() -> Graph {
    let graph = graph_of(vec![
        node(
            "demand",
            NodeKind::Distribution(DistributionSpec::normal(100.0, 15.0)),
        ),
        node("out", NodeKind::output()),
    ]);
    wire(graph, "demand", "out")
}

fn profit_graph() -> Graph {
    let graph = graph_of(vec![
        node(
            "demand",
            NodeKind::Distribution(DistributionSpec::normal(100.0, 15.0)),
        ),
        node(
            "cost",
            NodeKind::Distribution(DistributionSpec::uniform(40.0, 60.0)),
        ),
        node("profit", NodeKind::transformer("demand * 1.5 - cost"))
            .with_inputs(vec![
                crate::model::Port::number("demand"),
                crate::model::Port::number("cost"),
            ]),
        node("out", NodeKind::output()),
    ]);
    let e1 = super::link(&graph, "demand", "value", "profit", "demand");
    let e2 = super::link(&graph, "cost", "value", "profit", "cost");
    let graph = graph.add_edge(e1).unwrap().add_edge(e2).unwrap();
    wire(graph, "profit", "out")
}

/// Normal(100, 15) over 10,000 iterations recovers its mean and deviation
#[test]
fn test_normal_convergence() {
    let config = SimulationConfig::new(10_000).with_seed(42);
    let result = run_monte_carlo_simulation(&demand_graph(), &config, None);
    assert!(result.success, "{:?}", result.error);

    let metrics = result.metrics("out").expect("metrics for out");
    assert_eq!(metrics.count, 10_000);
    assert!(
        (metrics.mean - 100.0).abs() < 1.0,
        "mean {} should be within 1 of 100",
        metrics.mean
    );
    assert!(
        (metrics.standard_deviation - 15.0).abs() < 1.0,
        "std dev {} should be within 1 of 15",
        metrics.standard_deviation
    );
    assert!(metrics.p5 <= metrics.p25);
    assert!(metrics.p25 <= metrics.median);
    assert!(metrics.median <= metrics.p75);
    assert!(metrics.p75 <= metrics.p95);
    assert!(metrics.value_at_risk <= metrics.mean);
    assert!(metrics.conditional_value_at_risk <= metrics.value_at_risk);
    assert!(metrics.skewness.abs() < 0.1, "normal samples are nearly symmetric");
}

/// Two runs with the same seed are bit-identical; another seed differs
#[test]
fn test_seeded_runs_are_reproducible() {
    let graph = profit_graph();
    let config = SimulationConfig::new(500).with_seed(2024);
    let first = run_monte_carlo_simulation(&graph, &config, None);
    let second = run_monte_carlo_simulation(&graph, &config, None);
    assert_eq!(first.results, second.results);
    assert_eq!(first.aggregated, second.aggregated);

    let other = run_monte_carlo_simulation(&graph, &config.clone().with_seed(2025), None);
    assert_ne!(first.samples("out"), other.samples("out"));
}

/// An unseeded run reports the seed it drew, which replays the run
#[test]
fn test_drawn_seed_replays() {
    let graph = demand_graph();
    let first = run_monte_carlo_simulation(&graph, &SimulationConfig::new(50), None);
    let replay = run_monte_carlo_simulation(
        &graph,
        &SimulationConfig::new(50).with_seed(first.seed),
        None,
    );
    assert_eq!(first.samples("out"), replay.samples("out"));
}

/// Batched parallel execution matches a single-threaded run
#[cfg(feature = "parallel")]
#[test]
fn test_parallel_matches_sequential() {
    let graph = profit_graph();
    let config = SimulationConfig::new(1_234).with_seed(9);
    let parallel = run_monte_carlo_simulation(&graph, &config, None);
    let sequential =
        run_monte_carlo_simulation(&graph, &config.clone().with_max_parallelism(1), None);
    let bounded = run_monte_carlo_simulation(&graph, &config.with_max_parallelism(3), None);
    assert!(parallel.success && sequential.success && bounded.success);
    assert_eq!(parallel.results, sequential.results);
    assert_eq!(bounded.results, sequential.results);
}

/// Cancelling from the progress callback stops at the next iteration
#[test]
fn test_cancel_from_callback() {
    let progress = SimulationProgress::new();
    let handle = progress.clone();
    let progress = progress.with_callback(move |update| {
        if update.progress >= 50 {
            handle.cancel();
        }
    });
    let config = SimulationConfig::new(1_000)
        .with_seed(5)
        .with_max_parallelism(1);
    let result = run_monte_carlo_simulation(&demand_graph(), &config, Some(&progress));

    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("cancelled"));
    assert_eq!(result.iterations, 500);
    assert_eq!(result.results.len(), 500);
    assert_eq!(result.aggregated["out:value"].count, 500);
}

/// Deterministic mode runs exactly once regardless of `iterations`
#[test]
fn test_deterministic_mode_runs_once() {
    let config = SimulationConfig {
        iterations: 999,
        ..SimulationConfig::deterministic()
    }
    .with_seed(1);
    let result = run_monte_carlo_simulation(&demand_graph(), &config, None);
    assert!(result.success);
    assert_eq!(result.iterations, 1);
}

/// Intermediates are kept per iteration only on request
#[test]
fn test_capture_intermediates() {
    let graph = profit_graph();
    let plain = run_monte_carlo_simulation(&graph, &SimulationConfig::new(10).with_seed(3), None);
    assert!(plain.intermediates.is_none());

    let config = SimulationConfig::new(10).with_seed(3).capturing_intermediates();
    let captured = run_monte_carlo_simulation(&graph, &config, None);
    let steps = captured.intermediates.expect("intermediates");
    assert_eq!(steps.len(), 10);
    assert_eq!(steps[4]["profit"], captured.results[4].value);
    assert!(steps[4].contains_key("cost"));
}

/// A failing iteration stops the run and is reported with its node
#[test]
fn test_failing_iteration_is_reported() {
    let graph = graph_of(vec![
        node(
            "draw",
            NodeKind::Distribution(DistributionSpec::uniform(0.0, 1.0)),
        ),
        node(
            "limit",
            NodeKind::Constraint(crate::model::ConstraintData {
                max: Some(0.9),
                fatal: true,
                ..Default::default()
            }),
        ),
        node("out", NodeKind::output()),
    ]);
    let graph = wire(wire(graph, "draw", "limit"), "limit", "out");
    let result = run_monte_carlo_simulation(&graph, &SimulationConfig::new(1_000).with_seed(8), None);

    assert!(!result.success);
    let failed = result.failed_iteration.expect("a draw above 0.9");
    assert_eq!(result.iterations, failed);
    assert_eq!(result.failed_node.as_ref().map(|id| id.as_str()), Some("limit"));
    assert!(result.samples("out").iter().all(|&x| x <= 0.9));
}
