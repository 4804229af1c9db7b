//! Per-type node semantics

use rand::RngCore;
use serde::{Deserialize, Serialize};

use super::executor::{RunState, Step, run_iteration};
use super::plan::{Compiled, ExecutionPlan, PlannedNode};
use crate::error::{ExecutionError, ExpressionError};
use crate::expr::{self, Expr, ExpressionContext};
use crate::model::{
    AggregationMethod, ConstraintData, ConstraintMode, Node, NodeId, NodeKind, PidData,
    StateMachineData, Value,
};

/// A constraint that did not hold, recorded without halting the run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstraintViolation {
    pub node_id: NodeId,
    pub iteration: usize,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    pub message: String,
}

/// Memory a stateful node carries from one iteration to the next
#[derive(Debug, Clone)]
pub(crate) enum NodeState {
    Stateless,
    Integrator(Option<f64>),
    Filter(Option<f64>),
    Pid {
        integral: f64,
        previous_error: Option<f64>,
    },
    StateMachine(Option<String>),
    Subgraph(Box<RunState>),
}

impl NodeState {
    pub(crate) fn initial(node: &Node, planned: &PlannedNode) -> Self {
        match (&node.kind, &planned.compiled) {
            (NodeKind::Integrator(_), _) => NodeState::Integrator(None),
            (NodeKind::Filter(_), _) => NodeState::Filter(None),
            (NodeKind::PidController(_), _) => NodeState::Pid {
                integral: 0.0,
                previous_error: None,
            },
            (NodeKind::StateMachine(_), _) => NodeState::StateMachine(None),
            (_, Compiled::Subgraph(inner)) => NodeState::Subgraph(Box::new(RunState::new(inner))),
            _ => NodeState::Stateless,
        }
    }
}

pub(crate) struct NodeEnv<'a, 'c> {
    pub node: &'a Node,
    pub planned: &'a PlannedNode,
    pub ctx: &'a ExpressionContext<'c>,
    pub step: &'a Step<'a>,
}

impl NodeEnv<'_, '_> {
    fn eval(&self, expr: &Expr, rng: &mut dyn RngCore) -> Result<Value, ExecutionError> {
        self.eval_in(self.ctx, expr, rng)
    }

    fn eval_in(
        &self,
        ctx: &ExpressionContext<'_>,
        expr: &Expr,
        rng: &mut dyn RngCore,
    ) -> Result<Value, ExecutionError> {
        expr::evaluate(expr, ctx, rng).map_err(|err| ExecutionError::Expression {
            node_id: self.node.id.clone(),
            source: ExpressionError::Eval(err),
        })
    }

    fn failure(&self, message: impl Into<String>) -> ExecutionError {
        ExecutionError::Evaluation {
            node_id: self.node.id.clone(),
            message: message.into(),
        }
    }

    /// Named input, or the first input when there is no port of that name
    fn input(&self, name: &str) -> &Value {
        static UNDEFINED: Value = Value::Undefined;
        self.ctx
            .inputs
            .get(name)
            .or_else(|| self.ctx.inputs.as_object().and_then(|m| m.values().next()))
            .unwrap_or(&UNDEFINED)
    }
}

/// Compute one node's output for the current iteration.
pub(crate) fn evaluate_node(
    env: &NodeEnv<'_, '_>,
    state: &mut NodeState,
    rng: &mut dyn RngCore,
    violations: &mut Vec<ConstraintViolation>,
) -> Result<Value, ExecutionError> {
    let node = env.node;
    match (&node.kind, &env.planned.compiled) {
        (NodeKind::Constant(data), _) => Ok(data.value.clone()),
        (NodeKind::Parameter(data), _) => {
            let key = data.name.as_deref().unwrap_or(node.id.as_str());
            let value = env
                .step
                .params
                .get(key)
                .filter(|v| !v.is_undefined())
                .unwrap_or(&data.value);
            Ok(match value {
                Value::Number(n) => Value::Number(bound(*n, data.min, data.max)),
                other => other.clone(),
            })
        }
        (NodeKind::Distribution(spec), _) => {
            spec.sample(rng)
                .map(Value::Number)
                .map_err(|source| ExecutionError::InvalidDistribution {
                    node_id: node.id.clone(),
                    source,
                })
        }
        (NodeKind::Transformer(_), Compiled::Transformer(expr)) => env.eval(expr, rng),
        (NodeKind::Aggregator(data), _) => aggregate(env, data.method),
        (NodeKind::Decision(data), Compiled::Decision(condition)) => {
            let result = env.eval(condition, rng)?;
            let branch = if result.is_truthy() {
                &data.true_value
            } else {
                &data.false_value
            };
            Ok(branch.clone().unwrap_or(result))
        }
        (NodeKind::Constraint(data), Compiled::Constraint(expr)) => {
            constrain(env, data, expr.as_deref(), rng, violations)
        }
        (NodeKind::Output(_), _) => Ok(env.input("value").clone()),
        (NodeKind::Subgraph(_), Compiled::Subgraph(inner)) => {
            let NodeState::Subgraph(inner_state) = state else {
                return Err(env.failure("subgraph state missing"));
            };
            run_subgraph(env, inner, inner_state, rng, violations)
        }
        (NodeKind::Integrator(data), _) => {
            let NodeState::Integrator(previous) = state else {
                return Err(env.failure("integrator state missing"));
            };
            let rate = env.input("rate").to_number();
            let next = previous.unwrap_or(data.initial_value) + rate * env.step.time_step;
            *previous = Some(next);
            Ok(Value::Number(next))
        }
        (NodeKind::Filter(data), _) => {
            let NodeState::Filter(previous) = state else {
                return Err(env.failure("filter state missing"));
            };
            let x = env.input("value").to_number();
            let next = match previous {
                Some(prev) => data.alpha * x + (1.0 - data.alpha) * *prev,
                None => x,
            };
            *previous = Some(next);
            Ok(Value::Number(next))
        }
        (NodeKind::PidController(data), _) => {
            let NodeState::Pid {
                integral,
                previous_error,
            } = state
            else {
                return Err(env.failure("controller state missing"));
            };
            let measurement = env.input("measurement").to_number();
            Ok(Value::Number(pid_step(
                data,
                measurement,
                env.step.time_step,
                integral,
                previous_error,
            )))
        }
        (NodeKind::StateMachine(data), Compiled::StateMachine(conditions)) => {
            let NodeState::StateMachine(current) = state else {
                return Err(env.failure("state machine state missing"));
            };
            transition(env, data, conditions, current, rng)
        }
        (kind, _) => Err(env.failure(format!(
            "{} node was not compiled",
            kind.type_name()
        ))),
    }
}

fn bound(x: f64, min: Option<f64>, max: Option<f64>) -> f64 {
    let x = min.map_or(x, |lo| x.max(lo));
    max.map_or(x, |hi| x.min(hi))
}

fn aggregate(env: &NodeEnv<'_, '_>, method: AggregationMethod) -> Result<Value, ExecutionError> {
    let mut xs = Vec::new();
    if let Some(inputs) = env.ctx.inputs.as_object() {
        for value in inputs.values() {
            value.collect_numbers(&mut xs);
        }
    }
    if xs.is_empty() {
        return Err(env.failure("aggregator has no input values"));
    }
    let nan_aware = |pick: fn(f64, f64) -> f64| {
        xs.iter()
            .copied()
            .reduce(|a, b| if a.is_nan() || b.is_nan() { f64::NAN } else { pick(a, b) })
            .unwrap_or(f64::NAN)
    };
    let result = match method {
        AggregationMethod::Sum => xs.iter().sum(),
        AggregationMethod::Mean => xs.iter().sum::<f64>() / xs.len() as f64,
        AggregationMethod::Min => nan_aware(f64::min),
        AggregationMethod::Max => nan_aware(f64::max),
        AggregationMethod::Product => xs.iter().product(),
    };
    Ok(Value::Number(result))
}

fn constrain(
    env: &NodeEnv<'_, '_>,
    data: &ConstraintData,
    expr: Option<&Expr>,
    rng: &mut dyn RngCore,
    violations: &mut Vec<ConstraintViolation>,
) -> Result<Value, ExecutionError> {
    let input = env.input("value").clone();
    let (value, predicate_holds) = match expr {
        Some(expr) => match env.eval(expr, rng)? {
            Value::Bool(holds) => (input, holds),
            other => (other, true),
        },
        None => (input, true),
    };

    let lo = data.min.unwrap_or(f64::NEG_INFINITY);
    let hi = data.max.unwrap_or(f64::INFINITY);
    if lo.is_nan() || hi.is_nan() {
        return Err(env.failure("constraint bounds must be numbers".to_string()));
    }
    if lo > hi {
        return Err(env.failure(format!("constraint bounds are inverted: [{lo}, {hi}]")));
    }
    let x = value.to_number();
    let in_bounds = !(x < lo || x > hi);
    if predicate_holds && in_bounds {
        return Ok(value);
    }

    if data.fatal {
        return Err(ExecutionError::ConstraintViolated {
            node_id: env.node.id.clone(),
            value: x,
            min: lo,
            max: hi,
        });
    }
    let message = if predicate_holds {
        format!("{x} outside [{lo}, {hi}]")
    } else {
        "constraint expression evaluated to false".to_string()
    };
    violations.push(ConstraintViolation {
        node_id: env.node.id.clone(),
        iteration: env.step.iteration,
        value: x,
        min: data.min,
        max: data.max,
        message,
    });

    Ok(match data.mode {
        ConstraintMode::Clamp if !in_bounds => Value::Number(x.clamp(lo, hi)),
        _ => value,
    })
}

fn pid_step(
    data: &PidData,
    measurement: f64,
    dt: f64,
    integral: &mut f64,
    previous_error: &mut Option<f64>,
) -> f64 {
    let error = data.setpoint - measurement;
    *integral += error * dt;
    let derivative = match *previous_error {
        Some(prev) if dt > 0.0 => (error - prev) / dt,
        _ => 0.0,
    };
    *previous_error = Some(error);
    let out = data.kp * error + data.ki * *integral + data.kd * derivative;
    bound(out, data.output_min, data.output_max)
}

fn transition(
    env: &NodeEnv<'_, '_>,
    data: &StateMachineData,
    conditions: &[std::sync::Arc<Expr>],
    current: &mut Option<String>,
    rng: &mut dyn RngCore,
) -> Result<Value, ExecutionError> {
    if !data.states.is_empty() && !data.states.contains(&data.initial) {
        return Err(env.failure(format!("initial state '{}' is not a declared state", data.initial)));
    }
    let state = current.get_or_insert_with(|| data.initial.clone());

    // `$node.state` exposes the current state to transition conditions
    let mut node_data = env.planned.data.clone();
    if let Value::Object(map) = &mut node_data {
        map.insert("state".to_string(), Value::String(state.clone()));
    }
    let ctx = ExpressionContext {
        node: &node_data,
        ..*env.ctx
    };

    for (t, condition) in data.transitions.iter().zip(conditions) {
        if t.from != *state {
            continue;
        }
        if env.eval_in(&ctx, condition, rng)?.is_truthy() {
            *state = t.to.clone();
            break;
        }
    }
    Ok(Value::String(state.clone()))
}

fn run_subgraph(
    env: &NodeEnv<'_, '_>,
    inner: &ExecutionPlan<'_>,
    inner_state: &mut RunState,
    rng: &mut dyn RngCore,
    violations: &mut Vec<ConstraintViolation>,
) -> Result<Value, ExecutionError> {
    let mut params = inner.graph.params.clone().unwrap_or_else(Value::object);
    params.merge(env.ctx.inputs);
    let step = Step {
        params: &params,
        ..*env.step
    };
    run_iteration(inner, inner_state, &step, rng, violations)
        .map_err(|err| env.failure(format!("embedded graph: {err}")))?;

    let mut outputs = inner_state.outputs(inner);
    Ok(match outputs.len() {
        0 => Value::Undefined,
        1 => outputs.remove(0).value,
        _ => Value::Object(
            outputs
                .into_iter()
                .map(|o| (o.output_key, o.value))
                .collect(),
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pid_step() {
        let data = PidData {
            setpoint: 10.0,
            kp: 0.5,
            ki: 0.1,
            kd: 1.0,
            output_min: None,
            output_max: Some(4.5),
        };
        let mut integral = 0.0;
        let mut prev = None;
        // error 10: p=5, i=1, d=0, capped at 4.5
        assert_eq!(pid_step(&data, 0.0, 1.0, &mut integral, &mut prev), 4.5);
        // error 6: p=3, i=1.6, d=-4
        let out = pid_step(&data, 4.0, 1.0, &mut integral, &mut prev);
        assert!((out - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_bound() {
        assert_eq!(bound(5.0, Some(0.0), Some(3.0)), 3.0);
        assert_eq!(bound(-1.0, Some(0.0), None), 0.0);
        assert_eq!(bound(2.0, None, None), 2.0);
    }
}
