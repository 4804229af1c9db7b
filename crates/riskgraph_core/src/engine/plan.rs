//! Compilation of a graph into an index-based execution plan
//!
//! A plan is built once per run. Node ids and port ids are resolved to dense
//! indices, every expression is parsed, and the evaluation order is fixed, so
//! the per-iteration loop does no lookups by string and no parsing.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::error::{ExecutionError, ExpressionError};
use crate::expr::{Expr, ExpressionCache};
use crate::model::{Edge, Graph, NodeId, NodeKind, Value};
use crate::topology;

/// Where an input port's value comes from
#[derive(Debug)]
pub(crate) enum SourceKind {
    /// Same-iteration value of another node's output port
    Flow { node: usize, port: Option<String> },
    /// Delayed value held by the feedback history at this index
    Feedback { link: usize },
}

#[derive(Debug)]
pub(crate) struct Source {
    pub kind: SourceKind,
    pub weight: Option<f64>,
    pub condition: Option<Arc<Expr>>,
    pub transform: Option<Arc<Expr>>,
}

#[derive(Debug)]
pub(crate) struct InputSlot {
    pub name: String,
    pub required: bool,
    pub multiple: bool,
    pub default: Option<Value>,
    pub sources: Vec<Source>,
}

/// A FEEDBACK edge resolved to node indices
#[derive(Debug)]
pub(crate) struct FeedbackLink {
    pub edge: usize,
    pub source: usize,
    pub port: Option<String>,
    pub delay: usize,
    pub tolerance: Option<f64>,
    pub initial_value: Option<Value>,
}

/// Parsed expressions of one node, by role
#[derive(Debug)]
pub(crate) enum Compiled {
    None,
    Transformer(Arc<Expr>),
    Decision(Arc<Expr>),
    Constraint(Option<Arc<Expr>>),
    StateMachine(Vec<Arc<Expr>>),
    Subgraph(Box<ExecutionPlan<'static>>),
}

#[derive(Debug)]
pub(crate) struct PlannedNode {
    pub inputs: Vec<InputSlot>,
    pub compiled: Compiled,
    /// `$node` as seen by expressions
    pub data: Value,
    /// Names of the node's output ports; values are split by port name when
    /// there is more than one
    pub outputs: Vec<String>,
}

/// A graph compiled for repeated execution.
#[derive(Debug)]
pub struct ExecutionPlan<'g> {
    pub(crate) graph: std::borrow::Cow<'g, Graph>,
    pub(crate) order: Vec<usize>,
    pub(crate) nodes: Vec<PlannedNode>,
    pub(crate) index: FxHashMap<String, usize>,
    pub(crate) feedback: Vec<FeedbackLink>,
}

fn expression_error(node: &NodeId, err: impl Into<ExpressionError>) -> ExecutionError {
    ExecutionError::Expression {
        node_id: node.clone(),
        source: err.into(),
    }
}

fn parse_for(
    cache: &mut ExpressionCache,
    node: &NodeId,
    src: &str,
) -> Result<Arc<Expr>, ExecutionError> {
    cache
        .get_or_parse(src)
        .map_err(|err| expression_error(node, err))
}

impl<'g> ExecutionPlan<'g> {
    /// Compile `graph`, failing on DATA_FLOW cycles, dangling edges and
    /// malformed expressions.
    pub fn compile(graph: &'g Graph) -> Result<Self, ExecutionError> {
        Self::build(std::borrow::Cow::Borrowed(graph))
    }

    fn build(graph: std::borrow::Cow<'g, Graph>) -> Result<Self, ExecutionError> {
        let mut index = FxHashMap::default();
        for (i, node) in graph.nodes.iter().enumerate() {
            if index.insert(node.id.to_string(), i).is_some() {
                return Err(ExecutionError::InvalidGraph(format!(
                    "duplicate node id {}",
                    node.id
                )));
            }
        }

        let order = topology::topological_order(&graph).ok_or(ExecutionError::Cycle)?;

        let mut cache = ExpressionCache::new();
        let mut nodes = Vec::with_capacity(graph.nodes.len());
        for node in &graph.nodes {
            let compiled = match &node.kind {
                NodeKind::Transformer(data) => {
                    Compiled::Transformer(parse_for(&mut cache, &node.id, &data.expression)?)
                }
                NodeKind::Decision(data) => {
                    Compiled::Decision(parse_for(&mut cache, &node.id, &data.condition)?)
                }
                NodeKind::Constraint(data) => Compiled::Constraint(
                    data.expression
                        .as_deref()
                        .map(|src| parse_for(&mut cache, &node.id, src))
                        .transpose()?,
                ),
                NodeKind::StateMachine(data) => Compiled::StateMachine(
                    data.transitions
                        .iter()
                        .map(|t| parse_for(&mut cache, &node.id, &t.condition))
                        .collect::<Result<_, _>>()?,
                ),
                NodeKind::Subgraph(data) => {
                    let inner = ExecutionPlan::build(std::borrow::Cow::Owned((*data.graph).clone()))
                        .map_err(|err| ExecutionError::Evaluation {
                            node_id: node.id.clone(),
                            message: format!("embedded graph: {err}"),
                        })?;
                    Compiled::Subgraph(Box::new(inner))
                }
                _ => Compiled::None,
            };

            let inputs = node
                .inputs
                .iter()
                .map(|port| InputSlot {
                    name: port.name.clone(),
                    required: port.required,
                    multiple: port.multiple,
                    default: port.default_value.clone(),
                    sources: Vec::new(),
                })
                .collect();

            nodes.push(PlannedNode {
                inputs,
                compiled,
                data: node.data_value(),
                outputs: node.outputs.iter().map(|p| p.name.clone()).collect(),
            });
        }

        let mut feedback = Vec::new();
        for (edge_index, edge) in graph.edges.iter().enumerate() {
            let (source, target, slot, port) = resolve_edge(&graph, &index, edge)?;
            let condition = edge
                .condition
                .as_deref()
                .map(|src| parse_for(&mut cache, &edge.target, src))
                .transpose()?;
            let transform = edge
                .transform
                .as_deref()
                .map(|src| parse_for(&mut cache, &edge.target, src))
                .transpose()?;

            let kind = if edge.is_feedback() {
                feedback.push(FeedbackLink {
                    edge: edge_index,
                    source,
                    port: port.clone(),
                    delay: edge.feedback_iterations.max(1),
                    tolerance: edge.convergence_tolerance,
                    initial_value: edge.initial_value.clone(),
                });
                SourceKind::Feedback {
                    link: feedback.len() - 1,
                }
            } else {
                SourceKind::Flow { node: source, port }
            };

            nodes[target].inputs[slot].sources.push(Source {
                kind,
                weight: edge.weight,
                condition,
                transform,
            });
        }

        debug!(
            graph = %graph.id,
            nodes = nodes.len(),
            edges = graph.edges.len(),
            feedback = feedback.len(),
            expressions = cache.len(),
            "compiled execution plan"
        );

        Ok(Self {
            graph,
            order,
            nodes,
            index,
            feedback,
        })
    }

    #[must_use]
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Node ids in evaluation order
    pub fn order(&self) -> impl Iterator<Item = &NodeId> {
        self.order.iter().map(|&i| &self.graph.nodes[i].id)
    }

    #[must_use]
    pub fn has_feedback(&self) -> bool {
        !self.feedback.is_empty()
    }

    /// Whether iterations of a run depend on each other
    #[must_use]
    pub fn is_stateful(&self) -> bool {
        self.has_feedback() || self.graph.nodes.iter().any(|n| n.kind.is_stateful())
    }

    pub(crate) fn node_index(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }
}

/// Resolve an edge to (source index, target index, target slot, source port
/// name when the source has several outputs)
fn resolve_edge(
    graph: &Graph,
    index: &FxHashMap<String, usize>,
    edge: &Edge,
) -> Result<(usize, usize, usize, Option<String>), ExecutionError> {
    let invalid = |detail: String| {
        ExecutionError::InvalidGraph(format!("edge {}: {detail}", edge.id))
    };
    let &source = index
        .get(edge.source.as_str())
        .ok_or_else(|| invalid(format!("source node {} does not exist", edge.source)))?;
    let &target = index
        .get(edge.target.as_str())
        .ok_or_else(|| invalid(format!("target node {} does not exist", edge.target)))?;

    let source_node = &graph.nodes[source];
    let out = source_node
        .outputs
        .iter()
        .find(|p| p.id == edge.source_port)
        .ok_or_else(|| invalid(format!("source port {} does not exist", edge.source_port)))?;
    let slot = graph.nodes[target]
        .inputs
        .iter()
        .position(|p| p.id == edge.target_port)
        .ok_or_else(|| invalid(format!("target port {} does not exist", edge.target_port)))?;

    let port = (source_node.outputs.len() > 1).then(|| out.name.clone());
    Ok((source, target, slot, port))
}
