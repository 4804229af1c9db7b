//! Deterministic single-pass graph execution
//!
//! A graph is compiled into an [`ExecutionPlan`] and stepped by an
//! [`Executor`]. [`execute_graph`] wraps one iteration and folds any failure
//! into a `success: false` result.

mod executor;
mod feedback;
mod nodes;
mod plan;

use std::collections::BTreeMap;

use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub use executor::{Executor, IterationOutput, OutputValue};
pub use feedback::{CONVERGENCE_WINDOW, ConvergenceReport};
pub use nodes::ConstraintViolation;
pub use plan::ExecutionPlan;

use crate::error::ExecutionError;
use crate::model::{Graph, NodeId, Value};

/// Outcome of [`execute_graph`]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub success: bool,
    /// OUTPUT node values; empty when the run failed
    pub outputs: Vec<OutputValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Node whose evaluation failed, when the failure is node-level
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_node: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraint_violations: Vec<ConstraintViolation>,
    /// Every node's computed value, keyed by node id
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_values: BTreeMap<String, Value>,
}

impl ExecutionResult {
    pub(crate) fn failed(err: &ExecutionError) -> Self {
        Self {
            success: false,
            error: Some(err.to_string()),
            failed_node: err.node_id().cloned(),
            ..Self::default()
        }
    }

    /// Value of the OUTPUT node with this id
    #[must_use]
    pub fn output(&self, node_id: &str) -> Option<&Value> {
        self.outputs
            .iter()
            .find(|o| o.node_id.as_str() == node_id)
            .map(|o| &o.value)
    }
}

/// Run the graph once with `parameters` overlaid on its `params`.
///
/// Cyclic graphs fail before any node is evaluated. A node failure discards
/// everything computed so far.
pub fn execute_graph(graph: &Graph, parameters: &Value, rng: &mut dyn RngCore) -> ExecutionResult {
    match try_execute(graph, parameters, rng) {
        Ok(result) => result,
        Err(err) => {
            debug!(graph = %graph.id, error = %err, "graph execution failed");
            ExecutionResult::failed(&err)
        }
    }
}

fn try_execute(
    graph: &Graph,
    parameters: &Value,
    rng: &mut dyn RngCore,
) -> Result<ExecutionResult, ExecutionError> {
    let plan = ExecutionPlan::compile(graph)?;
    let mut executor = Executor::new(&plan).with_parameters(parameters);
    let output = executor.step(0, rng)?;
    Ok(ExecutionResult {
        success: true,
        outputs: output.outputs,
        error: None,
        failed_node: None,
        constraint_violations: output.violations,
        node_values: executor.node_values(),
    })
}
