//! Tree-walking evaluator
//!
//! Operator semantics follow the loose, never-throwing arithmetic of the graph
//! editor's expression language: operands are coerced with
//! [`Value::to_number`], unresolved paths read as `Undefined`, and only
//! unknown functions, wrong arities and out-of-domain arguments are errors.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use rand::RngCore;

use super::ast::{BinaryOp, Expr, LogicalOp, Root, Segment, UnaryOp};
use super::functions;
use crate::error::EvalError;
use crate::model::Value;

static UNDEFINED: Value = Value::Undefined;

/// Read access to the most recent output of other nodes, for `$nodes.<id>`
pub trait NodeValues {
    fn node_value(&self, id: &str) -> Option<&Value>;
}

impl NodeValues for BTreeMap<String, Value> {
    fn node_value(&self, id: &str) -> Option<&Value> {
        self.get(id)
    }
}

/// The variables visible to one expression evaluation.
#[derive(Clone, Copy)]
pub struct ExpressionContext<'a> {
    pub node: &'a Value,
    pub inputs: &'a Value,
    pub params: &'a Value,
    pub time: f64,
    pub iteration: usize,
    pub nodes: Option<&'a dyn NodeValues>,
    /// Value carried by an edge, for edge conditions and transforms
    pub value: Option<&'a Value>,
}

impl Default for ExpressionContext<'_> {
    fn default() -> Self {
        Self {
            node: &UNDEFINED,
            inputs: &UNDEFINED,
            params: &UNDEFINED,
            time: 0.0,
            iteration: 0,
            nodes: None,
            value: None,
        }
    }
}

impl<'a> ExpressionContext<'a> {
    #[must_use]
    pub fn new(node: &'a Value, inputs: &'a Value, params: &'a Value) -> Self {
        Self {
            node,
            inputs,
            params,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_inputs(mut self, inputs: &'a Value) -> Self {
        self.inputs = inputs;
        self
    }

    #[must_use]
    pub fn with_params(mut self, params: &'a Value) -> Self {
        self.params = params;
        self
    }

    #[must_use]
    pub fn with_time(mut self, time: f64) -> Self {
        self.time = time;
        self
    }

    #[must_use]
    pub fn with_iteration(mut self, iteration: usize) -> Self {
        self.iteration = iteration;
        self
    }

    #[must_use]
    pub fn with_nodes(mut self, nodes: &'a dyn NodeValues) -> Self {
        self.nodes = Some(nodes);
        self
    }

    #[must_use]
    pub fn with_value(mut self, value: &'a Value) -> Self {
        self.value = Some(value);
        self
    }
}

pub(crate) struct Evaluator<'c, 'a> {
    ctx: &'c ExpressionContext<'a>,
    rng: &'c mut dyn RngCore,
}

impl<'c, 'a> Evaluator<'c, 'a> {
    pub(crate) fn new(ctx: &'c ExpressionContext<'a>, rng: &'c mut dyn RngCore) -> Self {
        Self { ctx, rng }
    }

    pub(crate) fn eval(&mut self, expr: &Expr) -> Result<Value, EvalError> {
        match expr {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Root(Root::Time) => Ok(Value::Number(self.ctx.time)),
            Expr::Root(Root::Iteration) => Ok(Value::Number(self.ctx.iteration as f64)),
            Expr::Root(Root::Nodes) => Ok(Value::Undefined),
            Expr::Root(root) => Ok(self.root(*root).clone()),
            Expr::Ident(name) => Ok(self.ident(name).clone()),
            Expr::Access { base, path } => self.access(base, path),
            Expr::Unary(op, operand) => {
                let v = self.eval(operand)?;
                Ok(match op {
                    UnaryOp::Neg => Value::Number(-v.to_number()),
                    UnaryOp::Plus => Value::Number(v.to_number()),
                    UnaryOp::Not => Value::Bool(!v.is_truthy()),
                })
            }
            Expr::Chain { first, rest } => {
                let mut acc = self.eval(first)?;
                for (op, rhs) in rest {
                    let rhs = self.eval(rhs)?;
                    acc = binary(*op, &acc, &rhs);
                }
                Ok(acc)
            }
            Expr::Logical { op, operands } => {
                for operand in operands {
                    let truthy = self.eval(operand)?.is_truthy();
                    match (op, truthy) {
                        (LogicalOp::And, false) => return Ok(Value::Bool(false)),
                        (LogicalOp::Or, true) => return Ok(Value::Bool(true)),
                        _ => {}
                    }
                }
                Ok(Value::Bool(*op == LogicalOp::And))
            }
            Expr::Ternary {
                cond,
                then,
                otherwise,
            } => {
                if self.eval(cond)?.is_truthy() {
                    self.eval(then)
                } else {
                    self.eval(otherwise)
                }
            }
            Expr::Call { name, args } => self.call(name, args),
        }
    }

    fn root(&self, root: Root) -> &'c Value {
        let ctx: &'c ExpressionContext<'a> = self.ctx;
        match root {
            Root::Node => ctx.node,
            Root::Inputs => ctx.inputs,
            Root::Params => ctx.params,
            Root::Value => ctx.value.unwrap_or(&UNDEFINED),
            Root::Time | Root::Iteration | Root::Nodes => &UNDEFINED,
        }
    }

    /// Bare identifiers read the node's inputs first, then graph parameters
    fn ident(&self, name: &str) -> &'c Value {
        let ctx: &'c ExpressionContext<'a> = self.ctx;
        ctx.inputs
            .get(name)
            .filter(|v| !v.is_undefined())
            .or_else(|| ctx.params.get(name))
            .unwrap_or(&UNDEFINED)
    }

    fn access(&mut self, base: &Expr, path: &[Segment]) -> Result<Value, EvalError> {
        let ctx: &'c ExpressionContext<'a> = self.ctx;
        match base {
            Expr::Root(Root::Nodes) => {
                let Some((first, rest)) = path.split_first() else {
                    return Ok(Value::Undefined);
                };
                let id = match first {
                    Segment::Field(name) => name.clone(),
                    Segment::Index(expr) => self.eval(expr)?.to_string(),
                };
                match ctx.nodes.and_then(|nodes| nodes.node_value(&id)) {
                    Some(v) => self.walk(v, rest),
                    None => Ok(Value::Undefined),
                }
            }
            Expr::Root(Root::Time | Root::Iteration) => {
                let owned = self.eval(base)?;
                self.walk(&owned, path)
            }
            Expr::Root(root) => {
                let start = self.root(*root);
                self.walk(start, path)
            }
            Expr::Ident(name) => {
                let start = self.ident(name);
                self.walk(start, path)
            }
            other => {
                let owned = self.eval(other)?;
                self.walk(&owned, path)
            }
        }
    }

    fn walk(&mut self, start: &Value, path: &[Segment]) -> Result<Value, EvalError> {
        let mut current = start;
        for segment in path {
            let next = match segment {
                Segment::Field(name) => match current.get(name) {
                    Some(v) => Some(v),
                    None if name == "length" => return Ok(length_of(current)),
                    None => None,
                },
                Segment::Index(expr) => {
                    let key = self.eval(expr)?;
                    current.index(&key)
                }
            };
            match next {
                Some(v) => current = v,
                None => return Ok(Value::Undefined),
            }
        }
        Ok(current.clone())
    }

    fn call(&mut self, name: &str, args: &[Expr]) -> Result<Value, EvalError> {
        match name {
            "if" => {
                functions::check_arity(name, "3", args.len(), args.len() == 3)?;
                if self.eval(&args[0])?.is_truthy() {
                    self.eval(&args[1])
                } else {
                    self.eval(&args[2])
                }
            }
            _ => {
                let values = args
                    .iter()
                    .map(|a| self.eval(a))
                    .collect::<Result<Vec<_>, _>>()?;
                functions::call(name, &values, &mut *self.rng)
            }
        }
    }
}

fn length_of(value: &Value) -> Value {
    match value {
        Value::Array(items) => Value::Number(items.len() as f64),
        Value::String(s) => Value::Number(s.chars().count() as f64),
        _ => Value::Undefined,
    }
}

pub(crate) fn binary(op: BinaryOp, lhs: &Value, rhs: &Value) -> Value {
    match op {
        BinaryOp::Add => match (lhs, rhs) {
            (Value::String(_), _) | (_, Value::String(_)) => Value::String(format!("{lhs}{rhs}")),
            _ => Value::Number(lhs.to_number() + rhs.to_number()),
        },
        BinaryOp::Sub => Value::Number(lhs.to_number() - rhs.to_number()),
        BinaryOp::Mul => Value::Number(lhs.to_number() * rhs.to_number()),
        BinaryOp::Div => Value::Number(lhs.to_number() / rhs.to_number()),
        BinaryOp::Mod => Value::Number(lhs.to_number() % rhs.to_number()),
        BinaryOp::Eq => Value::Bool(loose_eq(lhs, rhs)),
        BinaryOp::Ne => Value::Bool(!loose_eq(lhs, rhs)),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = match (lhs, rhs) {
                (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                _ => lhs.to_number().partial_cmp(&rhs.to_number()),
            };
            Value::Bool(ordering.is_some_and(|o| match op {
                BinaryOp::Lt => o == Ordering::Less,
                BinaryOp::Le => o != Ordering::Greater,
                BinaryOp::Gt => o == Ordering::Greater,
                _ => o != Ordering::Less,
            }))
        }
    }
}

/// `==` semantics: null and undefined only equal each other, mixed
/// primitives compare numerically, containers compare structurally.
pub(crate) fn loose_eq(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (a, b) if a.is_nullish() || b.is_nullish() => a.is_nullish() && b.is_nullish(),
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Array(_) | Value::Object(_), Value::Array(_) | Value::Object(_)) => lhs == rhs,
        (Value::Array(_) | Value::Object(_), _) | (_, Value::Array(_) | Value::Object(_)) => false,
        _ => lhs.to_number() == rhs.to_number(),
    }
}
