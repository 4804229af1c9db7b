//! Structural checks on a graph before it is run
//!
//! Errors mean the graph cannot be executed as stored. Warnings flag graphs
//! that run but are probably not what the author meant.

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::expr;
use crate::model::{EdgeId, Graph, NodeId, NodeKind};
use crate::topology;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueKind {
    DuplicateNode,
    DuplicateEdge,
    MissingNode,
    MissingPort,
    InvalidSubgraph,
    DisconnectedNode,
    Cycle,
    InvalidExpression,
    UnknownFunction,
    FeedbackDelay,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    pub kind: IssueKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edge_id: Option<EdgeId>,
}

impl ValidationIssue {
    fn node(kind: IssueKind, node: &NodeId, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            node_id: Some(node.clone()),
            edge_id: None,
        }
    }

    fn edge(kind: IssueKind, edge: &EdgeId, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            node_id: None,
            edge_id: Some(edge.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

/// Check a graph for errors that make it unusable and for suspect structure.
#[must_use]
pub fn validate_graph(graph: &Graph) -> ValidationResult {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let mut seen_nodes = FxHashSet::default();
    for node in &graph.nodes {
        if !seen_nodes.insert(&node.id) {
            errors.push(ValidationIssue::node(
                IssueKind::DuplicateNode,
                &node.id,
                format!("duplicate node id {}", node.id),
            ));
        }
    }

    let mut seen_edges = FxHashSet::default();
    for edge in &graph.edges {
        if !seen_edges.insert(&edge.id) {
            errors.push(ValidationIssue::edge(
                IssueKind::DuplicateEdge,
                &edge.id,
                format!("duplicate edge id {}", edge.id),
            ));
        }

        let source = graph.node(&edge.source);
        let target = graph.node(&edge.target);
        for (role, id, node) in [("source", &edge.source, source), ("target", &edge.target, target)]
        {
            if node.is_none() {
                errors.push(ValidationIssue::edge(
                    IssueKind::MissingNode,
                    &edge.id,
                    format!("edge {} references missing {role} node {id}", edge.id),
                ));
            }
        }
        if source.is_some_and(|n| !n.has_output(&edge.source_port)) {
            errors.push(ValidationIssue::edge(
                IssueKind::MissingPort,
                &edge.id,
                format!(
                    "edge {} references missing output port {} on node {}",
                    edge.id, edge.source_port, edge.source
                ),
            ));
        }
        if target.is_some_and(|n| !n.has_input(&edge.target_port)) {
            errors.push(ValidationIssue::edge(
                IssueKind::MissingPort,
                &edge.id,
                format!(
                    "edge {} references missing input port {} on node {}",
                    edge.id, edge.target_port, edge.target
                ),
            ));
        }

        for (what, src) in [("condition", &edge.condition), ("transform", &edge.transform)] {
            if let Some(src) = src
                && let Err(err) = expr::parse(src)
            {
                warnings.push(ValidationIssue::edge(
                    IssueKind::InvalidExpression,
                    &edge.id,
                    format!("edge {} has an invalid {what}: {err}", edge.id),
                ));
            }
        }

        if edge.is_feedback() && edge.feedback_iterations == 0 {
            warnings.push(ValidationIssue::edge(
                IssueKind::FeedbackDelay,
                &edge.id,
                format!(
                    "feedback edge {} has feedbackIterations 0; a delay of 1 is used",
                    edge.id
                ),
            ));
        }
    }

    for node in &graph.nodes {
        if graph.edges_of(&node.id).next().is_none() {
            warnings.push(ValidationIssue::node(
                IssueKind::DisconnectedNode,
                &node.id,
                format!("node {} ({}) is not connected", node.name, node.id),
            ));
        }

        for src in node.kind.expressions() {
            match expr::parse(src) {
                Ok(parsed) => {
                    for name in expr::unknown_functions(&parsed) {
                        warnings.push(ValidationIssue::node(
                            IssueKind::UnknownFunction,
                            &node.id,
                            format!("node {} calls unknown function {name}()", node.id),
                        ));
                    }
                }
                Err(err) => warnings.push(ValidationIssue::node(
                    IssueKind::InvalidExpression,
                    &node.id,
                    format!("node {} has an invalid expression '{src}': {err}", node.id),
                )),
            }
        }

        if let NodeKind::Subgraph(data) = &node.kind {
            let inner = validate_graph(&data.graph);
            for issue in inner.errors {
                errors.push(ValidationIssue::node(
                    IssueKind::InvalidSubgraph,
                    &node.id,
                    format!("subgraph of node {}: {}", node.id, issue.message),
                ));
            }
        }
    }

    if let Some(cycle) = topology::detect_cycle(graph) {
        let path = cycle
            .iter()
            .map(NodeId::as_str)
            .collect::<Vec<_>>()
            .join(" -> ");
        warnings.push(ValidationIssue {
            kind: IssueKind::Cycle,
            message: format!("cycle detected among data-flow edges: {path}"),
            node_id: cycle.first().cloned(),
            edge_id: None,
        });
    }

    ValidationResult {
        valid: errors.is_empty(),
        errors,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Edge, Node};

    fn pair() -> (Graph, Node, Node) {
        let a = Node::new("a", NodeKind::constant(1.0)).with_id("a");
        let b = Node::new("b", NodeKind::output()).with_id("b");
        let graph = Graph::new("g")
            .add_node(a.clone())
            .unwrap()
            .add_node(b.clone())
            .unwrap();
        (graph, a, b)
    }

    fn kinds(issues: &[ValidationIssue]) -> Vec<IssueKind> {
        issues.iter().map(|i| i.kind).collect()
    }

    #[test]
    fn test_clean_graph() {
        let (graph, a, b) = pair();
        let graph = graph
            .add_edge(Edge::connect(&a, "value", &b, "value").unwrap())
            .unwrap();
        let result = validate_graph(&graph);
        assert!(result.valid);
        assert!(result.errors.is_empty());
        assert!(result.warnings.is_empty(), "{:?}", result.warnings);
    }

    #[test]
    fn test_disconnected_nodes_warn() {
        let (graph, _, _) = pair();
        let result = validate_graph(&graph);
        assert!(result.valid);
        assert_eq!(
            kinds(&result.warnings),
            vec![IssueKind::DisconnectedNode, IssueKind::DisconnectedNode]
        );
    }

    #[test]
    fn test_dangling_edge_is_error() {
        let (mut graph, a, b) = pair();
        // bypass add_edge checks, as an imported document could
        graph
            .edges
            .push(Edge::new("a", a.outputs[0].id.clone(), "ghost", b.inputs[0].id.clone()));
        graph
            .edges
            .push(Edge::new("a", "no-such-port", "b", b.inputs[0].id.clone()));
        let result = validate_graph(&graph);
        assert!(!result.valid);
        assert_eq!(
            kinds(&result.errors),
            vec![IssueKind::MissingNode, IssueKind::MissingPort]
        );
    }

    #[test]
    fn test_duplicates_are_errors() {
        let (mut graph, a, _) = pair();
        graph.nodes.push(a);
        let result = validate_graph(&graph);
        assert!(!result.valid);
        assert_eq!(kinds(&result.errors), vec![IssueKind::DuplicateNode]);
    }

    #[test]
    fn test_cycle_and_bad_expression_are_warnings() {
        let x = Node::new("x", NodeKind::transformer("value +")).with_id("x");
        let y = Node::new("y", NodeKind::transformer("frob(value)")).with_id("y");
        let graph = Graph::new("g")
            .add_node(x.clone())
            .unwrap()
            .add_node(y.clone())
            .unwrap()
            .add_edge(Edge::connect(&x, "value", &y, "value").unwrap())
            .unwrap()
            .add_edge(Edge::connect(&y, "value", &x, "value").unwrap())
            .unwrap();
        let result = validate_graph(&graph);
        assert!(result.valid);
        let warnings = kinds(&result.warnings);
        assert!(warnings.contains(&IssueKind::Cycle));
        assert!(warnings.contains(&IssueKind::InvalidExpression));
        assert!(warnings.contains(&IssueKind::UnknownFunction));
        let bad = result
            .warnings
            .iter()
            .find(|w| w.kind == IssueKind::InvalidExpression)
            .unwrap();
        assert_eq!(bad.node_id, Some(NodeId::from("x")));
    }
}
