//! One-parameter sweeps over a node's data field.
//!
//! Every point runs against a modified copy of the graph with the same seed,
//! so differences between points come from the swept value alone.

use rand::SeedableRng;
use rand::rngs::SmallRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::SensitivityConfig;
use crate::engine::{ExecutionPlan, Executor};
use crate::error::SensitivityError;
use crate::model::{Graph, NodeId, NodeKind, Value};
use crate::rng::{entropy_seed, iteration_seeds};
use crate::simulation::SimulationProgress;

/// Observed output at one swept input
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensitivityDataPoint {
    pub input: f64,
    pub output: f64,
}

/// Outcome of [`run_sensitivity_analysis`]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensitivityResult {
    pub success: bool,
    /// Points in ascending input order; partial when the sweep failed
    pub data_points: Vec<SensitivityDataPoint>,
    pub seed: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SensitivityResult {
    /// Point with the largest output, ignoring NaN
    #[must_use]
    pub fn peak(&self) -> Option<&SensitivityDataPoint> {
        self.data_points
            .iter()
            .filter(|p| !p.output.is_nan())
            .max_by(|a, b| a.output.total_cmp(&b.output))
    }
}

/// Copy of `graph` with `field` of the node's data payload set to `value`
fn with_field(
    graph: &Graph,
    node_id: &NodeId,
    field: &str,
    value: f64,
) -> Result<Graph, SensitivityError> {
    let node = graph
        .node(node_id)
        .ok_or_else(|| SensitivityError::NodeNotFound(node_id.clone()))?;
    let invalid = |reason: String| SensitivityError::InvalidField {
        node_id: node_id.clone(),
        field: field.to_string(),
        reason,
    };
    if field.is_empty() {
        return Err(invalid("empty field path".into()));
    }

    let mut tagged = serde_json::to_value(&node.kind).map_err(|e| invalid(e.to_string()))?;
    let mut slot = tagged
        .get_mut("data")
        .ok_or_else(|| invalid("node has no data payload".into()))?;
    let mut segments = field.split('.').peekable();
    while let Some(segment) = segments.next() {
        let object = slot
            .as_object_mut()
            .ok_or_else(|| invalid(format!("'{segment}' is not inside an object")))?;
        if segments.peek().is_none() {
            object.insert(segment.to_string(), serde_json::Value::from(value));
            break;
        }
        slot = object
            .entry(segment)
            .or_insert_with(|| serde_json::Value::Object(serde_json::Map::new()));
    }

    let kind: NodeKind = serde_json::from_value(tagged).map_err(|e| invalid(e.to_string()))?;
    graph
        .update_node(node_id, |n| n.kind = kind)
        .map_err(|_| SensitivityError::NodeNotFound(node_id.clone()))
}

/// Read a dotted `field` of an observed node value
fn read_field<'v>(value: &'v Value, field: &str) -> Option<&'v Value> {
    if field.is_empty() {
        return Some(value);
    }
    let found = field
        .split('.')
        .try_fold(value, |current, segment| current.get(segment));
    match found {
        None if field == "value" => Some(value),
        other => other,
    }
}

/// Key a swept PARAMETER reads its run-time override from, when the sweep
/// targets its value
fn parameter_binding(graph: &Graph, config: &SensitivityConfig) -> Option<String> {
    match &graph.node(&config.parameter_node_id)?.kind {
        NodeKind::Parameter(data) if config.parameter_field == "value" => Some(
            data.name
                .clone()
                .unwrap_or_else(|| config.parameter_node_id.as_str().to_string()),
        ),
        _ => None,
    }
}

/// Run parameters for one point. The binding key carries the swept value so
/// an entry of the same name in `params` cannot mask it.
fn point_parameters(base: &Value, binding: Option<&str>, input: f64) -> Value {
    let Some(key) = binding else {
        return base.clone();
    };
    let mut map = base.as_object().cloned().unwrap_or_default();
    map.insert(key.to_string(), Value::Number(input));
    Value::Object(map)
}

fn evaluate_point(
    graph: &Graph,
    config: &SensitivityConfig,
    parameters: &Value,
    seeds: &[u64],
) -> Result<f64, SensitivityError> {
    let plan = ExecutionPlan::compile(graph)?;
    let mut executor = Executor::new(&plan).with_parameters(parameters);
    let mut total = 0.0;
    for (iteration, &seed) in seeds.iter().enumerate() {
        let mut rng = SmallRng::seed_from_u64(seed);
        executor.step(iteration, &mut rng)?;
        let value = executor
            .node_value(config.output_node_id.as_str())
            .ok_or_else(|| SensitivityError::NodeNotFound(config.output_node_id.clone()))?;
        let observed =
            read_field(value, &config.output_field).ok_or_else(|| SensitivityError::OutputField {
                node_id: config.output_node_id.clone(),
                field: config.output_field.clone(),
            })?;
        total += observed.to_number();
    }
    Ok(total / seeds.len() as f64)
}

/// Sweep `config.parameter_field` of `config.parameter_node_id` across the
/// configured range and record the observed output at each point.
pub fn run_sensitivity_analysis(
    graph: &Graph,
    config: &SensitivityConfig,
    progress: Option<&SimulationProgress>,
) -> SensitivityResult {
    let seed = config.seed.unwrap_or_else(entropy_seed);
    let mut result = SensitivityResult {
        seed,
        ..SensitivityResult::default()
    };
    match sweep(graph, config, seed, progress, &mut result.data_points) {
        Ok(()) => result.success = true,
        Err(err) => {
            warn!(error = %err, completed = result.data_points.len(), "sensitivity sweep failed");
            result.error = Some(err.to_string());
        }
    }
    result
}

fn sweep(
    graph: &Graph,
    config: &SensitivityConfig,
    seed: u64,
    progress: Option<&SimulationProgress>,
    points: &mut Vec<SensitivityDataPoint>,
) -> Result<(), SensitivityError> {
    let values = config.sweep_values()?;
    for id in [&config.parameter_node_id, &config.output_node_id] {
        if graph.node(id).is_none() {
            return Err(SensitivityError::NodeNotFound(id.clone()));
        }
    }
    let seeds = iteration_seeds(seed, config.iterations.max(1));
    let binding = parameter_binding(graph, config);
    if let Some(progress) = progress {
        progress.reset(values.len());
    }
    info!(
        node = %config.parameter_node_id,
        field = %config.parameter_field,
        steps = values.len(),
        "starting sensitivity sweep"
    );

    for input in values {
        if progress.is_some_and(SimulationProgress::is_cancelled) {
            return Err(SensitivityError::Cancelled);
        }
        let modified = with_field(graph, &config.parameter_node_id, &config.parameter_field, input)?;
        let parameters = point_parameters(&config.parameters, binding.as_deref(), input);
        let output = evaluate_point(&modified, config, &parameters, &seeds)?;
        debug!(input, output, "sensitivity point");
        points.push(SensitivityDataPoint { input, output });
        if let Some(progress) = progress {
            progress.increment();
        }
    }
    Ok(())
}
