//! Tests for sensitivity sweeps over whole graphs

use super::{graph_of, link, node, wire};
use crate::analysis::{SensitivityConfig, run_sensitivity_analysis};
use crate::model::{Graph, NodeKind, ParameterData, Port, Value};
use crate::simulation::SimulationProgress;

/// `revenue = price * (1000 - 8 * price)` with `price` a PARAMETER node
fn revenue_graph() -> Graph {
    let graph = graph_of(vec![
        node("price", NodeKind::parameter(50.0)),
        node("revenue", NodeKind::transformer("price * (1000 - 8 * price)"))
            .with_inputs(vec![Port::number("price").required()]),
        node("out", NodeKind::output()),
    ]);
    let edge = link(&graph, "price", "value", "revenue", "price");
    wire(graph.add_edge(edge).unwrap(), "revenue", "out")
}

/// The revenue curve peaks strictly inside the swept range
#[test]
fn test_interior_maximum() {
    let config = SensitivityConfig::new("price", "value", "out", "value", (20.0, 80.0), 20);
    let result = run_sensitivity_analysis(&revenue_graph(), &config, None);
    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.data_points.len(), 20);

    let inputs: Vec<f64> = result.data_points.iter().map(|p| p.input).collect();
    assert_eq!(inputs.first(), Some(&20.0));
    assert_eq!(inputs.last(), Some(&80.0));
    assert!(inputs.windows(2).all(|w| w[0] < w[1]), "inputs ascend");

    let peak = result.peak().expect("a peak");
    assert!(peak.input > 20.0 && peak.input < 80.0, "peak at {}", peak.input);
    assert!((peak.input - 62.5).abs() < 60.0 / 19.0);

    // single maximum: rising then falling
    let outputs: Vec<f64> = result.data_points.iter().map(|p| p.output).collect();
    let top = outputs
        .iter()
        .position(|&o| o == peak.output)
        .unwrap();
    assert!(outputs[..=top].windows(2).all(|w| w[0] < w[1]));
    assert!(outputs[top..].windows(2).all(|w| w[0] > w[1]));
}

/// A graph or run parameter under the swept node's key does not pin the sweep
#[test]
fn test_sweep_wins_over_params_of_same_name() {
    let price = serde_json::from_str::<Value>(r#"{"price": 50}"#).unwrap();
    let graph = revenue_graph().with_params(price.clone());
    let config = SensitivityConfig::new("price", "value", "out", "value", (20.0, 80.0), 5)
        .with_parameters(price);
    let result = run_sensitivity_analysis(&graph, &config, None);
    assert!(result.success, "{:?}", result.error);

    let revenue = |p: f64| p * (1000.0 - 8.0 * p);
    for point in &result.data_points {
        assert_eq!(point.output, revenue(point.input), "at {}", point.input);
    }
    assert_ne!(result.data_points[0].output, result.data_points[4].output);
}

/// Parameter bounds still apply to swept values
#[test]
fn test_sweep_respects_parameter_bounds() {
    let graph = revenue_graph()
        .update_node(&"price".into(), |n| {
            n.kind = NodeKind::Parameter(ParameterData {
                value: Value::Number(50.0),
                name: None,
                min: None,
                max: Some(40.0),
            });
        })
        .unwrap();
    let config = SensitivityConfig::new("price", "value", "revenue", "", (30.0, 50.0), 3);
    let result = run_sensitivity_analysis(&graph, &config, None);
    let outputs: Vec<f64> = result.data_points.iter().map(|p| p.output).collect();
    assert_eq!(outputs[1], outputs[2], "40 and 50 both evaluate at the bound");
}

/// Progress counts sweep points
#[test]
fn test_progress_counts_points() {
    let progress = SimulationProgress::new();
    let config = SensitivityConfig::new("price", "value", "out", "value", (10.0, 20.0), 6);
    let result = run_sensitivity_analysis(&revenue_graph(), &config, Some(&progress));
    assert!(result.success);
    assert_eq!(progress.total(), 6);
    assert_eq!(progress.completed(), 6);
}
