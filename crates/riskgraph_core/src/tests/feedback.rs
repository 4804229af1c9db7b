//! Tests for FEEDBACK edges and stateful nodes
//!
//! These tests verify:
//! - A FEEDBACK edge delivers the value from `feedbackIterations` ago
//! - Convergence is reported without shortening the run
//! - INTEGRATOR, FILTER and STATE_MACHINE keep memory across iterations

use super::{graph_of, link, node, wire};
use crate::config::SimulationConfig;
use crate::engine::{ExecutionPlan, Executor};
use crate::model::{FilterData, Graph, IntegratorData, NodeKind, StateMachineData, Transition, Value};
use crate::rng::set_seed;
use crate::simulation::run_monte_carlo_simulation;

/// `t = value + 1` fed back into itself with the given delay
fn counter(delay: usize) -> Graph {
    let graph = graph_of(vec![
        node("t", NodeKind::transformer("value + 1")),
        node("out", NodeKind::output()),
    ]);
    let graph = wire(graph, "t", "out");
    let back = link(&graph, "t", "value", "t", "value")
        .feedback(delay)
        .with_initial_value(0.0);
    graph.add_edge(back).unwrap()
}

fn run(graph: &Graph, config: SimulationConfig) -> Vec<f64> {
    let result = run_monte_carlo_simulation(graph, &config.with_seed(1), None);
    assert!(result.success, "{:?}", result.error);
    result.samples("out")
}

/// Delay 1 counts up from the initial value
#[test]
fn test_single_iteration_delay() {
    assert_eq!(
        run(&counter(1), SimulationConfig::new(5)),
        vec![1.0, 2.0, 3.0, 4.0, 5.0]
    );
}

/// Delay 2 uses the initial value until two iterations exist
#[test]
fn test_two_iteration_delay() {
    assert_eq!(
        run(&counter(2), SimulationConfig::new(6)),
        vec![1.0, 1.0, 2.0, 2.0, 3.0, 3.0]
    );
}

/// A contracting loop converges; the run still completes every iteration
#[test]
fn test_convergence_is_advisory() {
    let graph = graph_of(vec![
        node("x", NodeKind::transformer("value * 0.5 + 10")),
        node("out", NodeKind::output()),
    ]);
    let graph = wire(graph, "x", "out");
    let back = link(&graph, "x", "value", "x", "value")
        .feedback(1)
        .with_tolerance(1e-3)
        .with_initial_value(0.0);
    let graph = graph.add_edge(back).unwrap();

    let result = run_monte_carlo_simulation(&graph, &SimulationConfig::new(40).with_seed(1), None);
    assert!(result.success);
    assert_eq!(result.iterations, 40, "convergence must not stop the run");
    let samples = result.samples("out");
    assert!((samples[39] - 20.0).abs() < 1e-6);

    let report = &result.convergence[0];
    assert!(report.converged);
    let at = report.converged_at_iteration.expect("converged iteration");
    assert!(at > 5 && at < 40, "converged at {at}");
    assert!(report.final_delta.unwrap() <= 1e-3);
}

/// Without a tolerance the loop is never reported converged
#[test]
fn test_no_tolerance_never_converges() {
    let result =
        run_monte_carlo_simulation(&counter(1), &SimulationConfig::new(3).with_seed(1), None);
    assert_eq!(result.convergence.len(), 1);
    assert!(!result.convergence[0].converged);
}

/// Integrator accumulates `rate * timeStep`
#[test]
fn test_integrator() {
    let graph = graph_of(vec![
        node("rate", NodeKind::constant(2.0)),
        node(
            "level",
            NodeKind::Integrator(IntegratorData { initial_value: 1.0 }),
        ),
        node("out", NodeKind::output()),
    ]);
    let edge = link(&graph, "rate", "value", "level", "rate");
    let graph = wire(graph.add_edge(edge).unwrap(), "level", "out");
    assert_eq!(
        run(&graph, SimulationConfig::new(4).with_time_step(0.5)),
        vec![2.0, 3.0, 4.0, 5.0]
    );
}

/// Filter smooths a ramp
#[test]
fn test_filter() {
    let graph = graph_of(vec![
        node("ramp", NodeKind::transformer("$iteration * 10")),
        node("smooth", NodeKind::Filter(FilterData { alpha: 0.5 })),
        node("out", NodeKind::output()),
    ]);
    let graph = wire(wire(graph, "ramp", "smooth"), "smooth", "out");
    assert_eq!(
        run(&graph, SimulationConfig::new(3)),
        vec![0.0, 5.0, 12.5]
    );
}

/// State machine fires the first matching transition once per iteration
#[test]
fn test_state_machine() {
    let machine = NodeKind::StateMachine(StateMachineData {
        states: vec!["idle".into(), "running".into(), "done".into()],
        initial: "idle".into(),
        transitions: vec![
            Transition {
                from: "idle".into(),
                to: "running".into(),
                condition: "$iteration >= 1".into(),
            },
            Transition {
                from: "running".into(),
                to: "done".into(),
                condition: "$iteration >= 3 && $node.state == \"running\"".into(),
            },
        ],
    });
    let graph = graph_of(vec![node("m", machine), node("out", NodeKind::output())]);
    let graph = wire(graph, "m", "out");

    let plan = ExecutionPlan::compile(&graph).unwrap();
    let mut executor = Executor::new(&plan);
    let mut rng = set_seed(0);
    let states: Vec<Value> = (0..5)
        .map(|i| executor.step(i, &mut rng).unwrap().outputs[0].value.clone())
        .collect();
    let expected: Vec<Value> = ["idle", "running", "running", "done", "done"]
        .into_iter()
        .map(Value::from)
        .collect();
    assert_eq!(states, expected);

    // reset forgets the current state
    executor.reset();
    let first = executor.step(3, &mut rng).unwrap();
    assert_eq!(first.outputs[0].value, Value::from("running"));
}

/// Stateful graphs replay identically from the same seed
#[test]
fn test_stateful_runs_reproducible() {
    let graph = graph_of(vec![
        node(
            "noise",
            NodeKind::Distribution(crate::model::DistributionSpec::normal(0.0, 1.0)),
        ),
        node("level", NodeKind::Integrator(IntegratorData::default())),
        node("out", NodeKind::output()),
    ]);
    let edge = link(&graph, "noise", "value", "level", "rate");
    let graph = wire(graph.add_edge(edge).unwrap(), "level", "out");
    let config = SimulationConfig::new(200);
    assert_eq!(run(&graph, config.clone()), run(&graph, config));
}
