//! Iteration loop: input assembly, node evaluation, feedback bookkeeping

use std::collections::BTreeMap;

use rand::RngCore;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::feedback::{ConvergenceReport, FeedbackHistory};
use super::nodes::{ConstraintViolation, NodeEnv, NodeState, evaluate_node};
use super::plan::{ExecutionPlan, InputSlot, Source, SourceKind};
use crate::error::{EvalError, ExecutionError, ExpressionError};
use crate::expr::{self, ExpressionContext, NodeValues};
use crate::model::{Graph, NodeId, NodeKind, Value};

/// One OUTPUT node's value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputValue {
    pub node_id: NodeId,
    pub output_key: String,
    pub value: Value,
}

/// Everything one iteration produced
#[derive(Debug, Clone, Default)]
pub struct IterationOutput {
    pub outputs: Vec<OutputValue>,
    pub violations: Vec<ConstraintViolation>,
}

/// Iteration-wide inputs shared by every node
#[derive(Debug, Clone, Copy)]
pub(crate) struct Step<'a> {
    pub iteration: usize,
    pub time: f64,
    pub time_step: f64,
    /// Effective `$params`
    pub params: &'a Value,
}

/// Mutable state of one run over a plan
#[derive(Debug, Clone)]
pub(crate) struct RunState {
    values: Vec<Value>,
    states: Vec<NodeState>,
    feedback: Vec<FeedbackHistory>,
}

impl RunState {
    pub(crate) fn new(plan: &ExecutionPlan<'_>) -> Self {
        Self {
            values: vec![Value::Undefined; plan.nodes.len()],
            states: plan
                .graph
                .nodes
                .iter()
                .zip(&plan.nodes)
                .map(|(node, planned)| NodeState::initial(node, planned))
                .collect(),
            feedback: plan
                .feedback
                .iter()
                .map(|link| FeedbackHistory::new(link.delay, link.tolerance))
                .collect(),
        }
    }

    /// Values of OUTPUT nodes from the last iteration, in graph order
    pub(crate) fn outputs(&self, plan: &ExecutionPlan<'_>) -> Vec<OutputValue> {
        plan.graph
            .nodes
            .iter()
            .zip(&self.values)
            .filter_map(|(node, value)| match &node.kind {
                NodeKind::Output(data) => Some(OutputValue {
                    node_id: node.id.clone(),
                    output_key: data.output_key.clone(),
                    value: value.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn values(&self) -> &[Value] {
        &self.values
    }
}

/// `$nodes` lookup over the values computed so far this iteration
struct NodesView<'a> {
    index: &'a FxHashMap<String, usize>,
    values: &'a [Value],
}

impl NodeValues for NodesView<'_> {
    fn node_value(&self, id: &str) -> Option<&Value> {
        self.index
            .get(id)
            .map(|&i| &self.values[i])
            .filter(|v| !v.is_undefined())
    }
}

/// Select a named output port's share of a node value
fn port_value<'v>(value: &'v Value, port: Option<&str>) -> &'v Value {
    match port {
        Some(name) => value.get(name).unwrap_or(value),
        None => value,
    }
}

/// Context for edge conditions and transforms: `$params`, `$time`,
/// `$iteration` and the carried `$value`
fn edge_context<'a>(step: &Step<'a>, carried: &'a Value) -> ExpressionContext<'a> {
    ExpressionContext::default()
        .with_params(step.params)
        .with_time(step.time)
        .with_iteration(step.iteration)
        .with_value(carried)
}

fn deliver(
    source: &Source,
    raw: Value,
    step: &Step<'_>,
    target: &NodeId,
    rng: &mut dyn RngCore,
) -> Result<Option<Value>, ExecutionError> {
    let eval_error = |err: EvalError| ExecutionError::Expression {
        node_id: target.clone(),
        source: ExpressionError::Eval(err),
    };

    if let Some(condition) = &source.condition
        && !expr::evaluate(condition, &edge_context(step, &raw), rng)
            .map_err(eval_error)?
            .is_truthy()
    {
        return Ok(None);
    }
    let value = match &source.transform {
        Some(transform) => {
            expr::evaluate(transform, &edge_context(step, &raw), rng).map_err(eval_error)?
        }
        None => raw,
    };
    Ok(Some(match (source.weight, value) {
        (Some(w), Value::Number(n)) => Value::Number(n * w),
        (_, v) => v,
    }))
}

fn gather_inputs(
    plan: &ExecutionPlan<'_>,
    node: usize,
    values: &[Value],
    feedback: &[FeedbackHistory],
    step: &Step<'_>,
    rng: &mut dyn RngCore,
) -> Result<Value, ExecutionError> {
    let node_id = &plan.graph.nodes[node].id;
    let mut inputs = BTreeMap::new();

    for slot in &plan.nodes[node].inputs {
        let mut delivered = Vec::with_capacity(slot.sources.len());
        for source in &slot.sources {
            let raw = match &source.kind {
                SourceKind::Flow { node, port } => {
                    Some(port_value(&values[*node], port.as_deref()).clone())
                }
                SourceKind::Feedback { link } => {
                    let link_def = &plan.feedback[*link];
                    feedback[*link]
                        .delayed()
                        .map(|v| port_value(v, link_def.port.as_deref()).clone())
                        .or_else(|| link_def.initial_value.clone())
                }
            };
            if let Some(raw) = raw
                && let Some(value) = deliver(source, raw, step, node_id, rng)?
            {
                delivered.push(value);
            }
        }

        if let Some(value) = resolve_slot(slot, delivered, node_id)? {
            inputs.insert(slot.name.clone(), value);
        }
    }
    Ok(Value::Object(inputs))
}

fn resolve_slot(
    slot: &InputSlot,
    mut delivered: Vec<Value>,
    node_id: &NodeId,
) -> Result<Option<Value>, ExecutionError> {
    if slot.multiple && !delivered.is_empty() {
        return Ok(Some(Value::Array(delivered)));
    }
    if let Some(last) = delivered.pop() {
        return Ok(Some(last));
    }
    match &slot.default {
        Some(default) => Ok(Some(default.clone())),
        None if slot.required => Err(ExecutionError::MissingInput {
            node_id: node_id.clone(),
            port: slot.name.clone(),
        }),
        None if slot.multiple => Ok(Some(Value::Array(Vec::new()))),
        None => Ok(None),
    }
}

/// Run one pass over the plan in topological order.
pub(crate) fn run_iteration(
    plan: &ExecutionPlan<'_>,
    state: &mut RunState,
    step: &Step<'_>,
    rng: &mut dyn RngCore,
    violations: &mut Vec<ConstraintViolation>,
) -> Result<(), ExecutionError> {
    let RunState {
        values,
        states,
        feedback,
    } = state;
    values.fill(Value::Undefined);

    for &i in &plan.order {
        let inputs = gather_inputs(plan, i, values.as_slice(), feedback.as_slice(), step, rng)?;
        let view = NodesView {
            index: &plan.index,
            values: values.as_slice(),
        };
        let planned = &plan.nodes[i];
        let ctx = ExpressionContext::new(&planned.data, &inputs, step.params)
            .with_time(step.time)
            .with_iteration(step.iteration)
            .with_nodes(&view);
        let env = NodeEnv {
            node: &plan.graph.nodes[i],
            planned,
            ctx: &ctx,
            step,
        };
        let value = evaluate_node(&env, &mut states[i], rng, violations)?;
        values[i] = value;
    }

    for (history, link) in feedback.iter_mut().zip(&plan.feedback) {
        let carried = port_value(&values[link.source], link.port.as_deref()).clone();
        history.record(step.iteration, carried);
    }
    Ok(())
}

/// `$params` for a run: graph parameters overlaid with run overrides
pub(crate) fn effective_params(graph: &Graph, overrides: &Value) -> Value {
    let mut params = graph.params.clone().unwrap_or_else(Value::object);
    if !overrides.is_nullish() {
        params.merge(overrides);
    }
    params
}

/// Steps a compiled plan through successive iterations.
///
/// Stateful nodes and FEEDBACK histories persist between calls to
/// [`Executor::step`] until [`Executor::reset`].
pub struct Executor<'p> {
    plan: &'p ExecutionPlan<'p>,
    state: RunState,
    params: Value,
    time_step: f64,
}

impl<'p> Executor<'p> {
    #[must_use]
    pub fn new(plan: &'p ExecutionPlan<'p>) -> Self {
        Self {
            plan,
            state: RunState::new(plan),
            params: effective_params(plan.graph(), &Value::Undefined),
            time_step: 1.0,
        }
    }

    /// Overlay run parameters on the graph's own `params`
    #[must_use]
    pub fn with_parameters(mut self, overrides: &Value) -> Self {
        self.params = effective_params(self.plan.graph(), overrides);
        self
    }

    #[must_use]
    pub fn with_time_step(mut self, time_step: f64) -> Self {
        self.time_step = time_step;
        self
    }

    /// Execute iteration `iteration`, drawing randomness from `rng`
    pub fn step(
        &mut self,
        iteration: usize,
        rng: &mut dyn RngCore,
    ) -> Result<IterationOutput, ExecutionError> {
        let step = Step {
            iteration,
            time: iteration as f64 * self.time_step,
            time_step: self.time_step,
            params: &self.params,
        };
        let mut violations = Vec::new();
        run_iteration(self.plan, &mut self.state, &step, rng, &mut violations)?;
        Ok(IterationOutput {
            outputs: self.state.outputs(self.plan),
            violations,
        })
    }

    /// Every node's value from the last iteration, keyed by node id
    #[must_use]
    pub fn node_values(&self) -> BTreeMap<String, Value> {
        self.plan
            .graph
            .nodes
            .iter()
            .zip(self.state.values())
            .map(|(node, value)| (node.id.to_string(), value.clone()))
            .collect()
    }

    /// Value of one node from the last iteration
    #[must_use]
    pub fn node_value(&self, id: &str) -> Option<&Value> {
        self.plan
            .node_index(id)
            .map(|i| &self.state.values()[i])
    }

    /// Convergence status of every FEEDBACK edge so far
    #[must_use]
    pub fn convergence(&self) -> Vec<ConvergenceReport> {
        self.state
            .feedback
            .iter()
            .zip(&self.plan.feedback)
            .map(|(history, link)| history.report(&self.plan.graph.edges[link.edge].id))
            .collect()
    }

    /// Forget all iteration-to-iteration memory
    pub fn reset(&mut self) {
        self.state = RunState::new(self.plan);
    }
}
