//! Graph and edge types, and the pure update operations on them
//!
//! Every mutation takes `&self` and returns a new `Graph` with a bumped
//! `version` and `updated_at`. The input graph is never modified.

use std::collections::BTreeMap;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use super::ids::{EdgeId, GraphId, NodeId, PortId};
use super::node::{Node, now};
use super::value::Value;
use crate::error::GraphError;

/// Dependency semantics of an edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeKind {
    /// Ordinary same-iteration dependency
    #[default]
    DataFlow,
    /// Back-edge carrying a value from an earlier iteration
    Feedback,
}

fn default_feedback_iterations() -> usize {
    1
}

/// A directed connection from an output port to an input port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: EdgeId,
    pub source: NodeId,
    pub source_port: PortId,
    pub target: NodeId,
    pub target_port: PortId,
    #[serde(default, rename = "type")]
    pub kind: EdgeKind,
    /// Multiplier applied to numeric values crossing the edge
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    /// Display-only delay for DATA_FLOW edges
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<f64>,
    /// Expression over `$value`; the edge delivers nothing when it is falsy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    /// Expression over `$value` replacing the carried value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<String>,
    /// Delay depth of a FEEDBACK edge, in iterations
    #[serde(default = "default_feedback_iterations")]
    pub feedback_iterations: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub convergence_tolerance: Option<f64>,
    /// Value a FEEDBACK edge delivers before its history is deep enough
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_value: Option<Value>,
}

impl Edge {
    #[must_use]
    pub fn new(
        source: impl Into<NodeId>,
        source_port: impl Into<PortId>,
        target: impl Into<NodeId>,
        target_port: impl Into<PortId>,
    ) -> Self {
        Self {
            id: EdgeId::generate(),
            source: source.into(),
            source_port: source_port.into(),
            target: target.into(),
            target_port: target_port.into(),
            kind: EdgeKind::DataFlow,
            weight: None,
            delay: None,
            condition: None,
            transform: None,
            feedback_iterations: default_feedback_iterations(),
            convergence_tolerance: None,
            initial_value: None,
        }
    }

    /// Wire two nodes by port name.
    pub fn connect(
        source: &Node,
        source_port: &str,
        target: &Node,
        target_port: &str,
    ) -> Result<Self, GraphError> {
        let out = source
            .output_port(source_port)
            .ok_or_else(|| GraphError::PortNotFound {
                node: source.id.clone(),
                port: source_port.to_string(),
            })?;
        let input = target
            .input_port(target_port)
            .ok_or_else(|| GraphError::PortNotFound {
                node: target.id.clone(),
                port: target_port.to_string(),
            })?;
        Ok(Self::new(
            source.id.clone(),
            out.id.clone(),
            target.id.clone(),
            input.id.clone(),
        ))
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<EdgeId>) -> Self {
        self.id = id.into();
        self
    }

    /// Turn this edge into a FEEDBACK edge delayed by `iterations`
    #[must_use]
    pub fn feedback(mut self, iterations: usize) -> Self {
        self.kind = EdgeKind::Feedback;
        self.feedback_iterations = iterations.max(1);
        self
    }

    #[must_use]
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.convergence_tolerance = Some(tolerance);
        self
    }

    #[must_use]
    pub fn with_initial_value(mut self, value: impl Into<Value>) -> Self {
        self.initial_value = Some(value.into());
        self
    }

    #[must_use]
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = Some(weight);
        self
    }

    #[must_use]
    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    #[must_use]
    pub fn with_transform(mut self, transform: impl Into<String>) -> Self {
        self.transform = Some(transform.into());
        self
    }

    #[must_use]
    pub fn is_feedback(&self) -> bool {
        self.kind == EdgeKind::Feedback
    }

    #[must_use]
    pub fn touches(&self, node: &NodeId) -> bool {
        &self.source == node || &self.target == node
    }
}

/// A scenario graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Graph {
    pub id: GraphId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
    /// Global parameters visible to every expression as `$params`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default)]
    pub version: u64,
    #[serde(default = "now")]
    pub created_at: Timestamp,
    #[serde(default = "now")]
    pub updated_at: Timestamp,
}

impl Graph {
    /// Create an empty graph with a fresh id
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let ts = now();
        Self {
            id: GraphId::generate(),
            name: name.into(),
            description: String::new(),
            nodes: Vec::new(),
            edges: Vec::new(),
            metadata: BTreeMap::new(),
            params: None,
            version: 1,
            created_at: ts,
            updated_at: ts,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn with_params(mut self, params: impl Into<Value>) -> Self {
        self.params = Some(params.into());
        self
    }

    #[must_use]
    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    #[must_use]
    pub fn edge(&self, id: &EdgeId) -> Option<&Edge> {
        self.edges.iter().find(|e| &e.id == id)
    }

    /// Edges touching `node`, in graph order
    pub fn edges_of<'a>(&'a self, node: &'a NodeId) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| e.touches(node))
    }

    fn touched(&self) -> Self {
        let mut next = self.clone();
        next.version += 1;
        next.updated_at = now();
        next
    }

    pub fn add_node(&self, node: Node) -> Result<Graph, GraphError> {
        if self.node(&node.id).is_some() {
            return Err(GraphError::DuplicateNode(node.id));
        }
        let mut next = self.touched();
        next.nodes.push(node);
        Ok(next)
    }

    /// Apply `update` to a copy of the node. The node id cannot be changed.
    ///
    /// Fails with [`GraphError::Reference`] if the update drops a port that
    /// an existing edge is wired to.
    pub fn update_node<F>(&self, id: &NodeId, update: F) -> Result<Graph, GraphError>
    where
        F: FnOnce(&mut Node),
    {
        let mut next = self.touched();
        let stamp = next.updated_at;
        let node = next
            .nodes
            .iter_mut()
            .find(|n| &n.id == id)
            .ok_or_else(|| GraphError::NodeNotFound(id.clone()))?;
        update(node);
        node.id = id.clone();
        node.updated_at = stamp;
        for edge in next.edges_of(id) {
            next.check_endpoints(edge)?;
        }
        Ok(next)
    }

    /// Remove a node and every edge touching it.
    pub fn remove_node(&self, id: &NodeId) -> Result<Graph, GraphError> {
        if self.node(id).is_none() {
            return Err(GraphError::NodeNotFound(id.clone()));
        }
        let mut next = self.touched();
        next.nodes.retain(|n| &n.id != id);
        next.edges.retain(|e| !e.touches(id));
        Ok(next)
    }

    /// Add an edge after checking both endpoints and ports exist.
    pub fn add_edge(&self, edge: Edge) -> Result<Graph, GraphError> {
        if self.edge(&edge.id).is_some() {
            return Err(GraphError::DuplicateEdge(edge.id));
        }
        self.check_endpoints(&edge)?;
        let mut next = self.touched();
        next.edges.push(edge);
        Ok(next)
    }

    pub fn remove_edge(&self, id: &EdgeId) -> Result<Graph, GraphError> {
        if self.edge(id).is_none() {
            return Err(GraphError::EdgeNotFound(id.clone()));
        }
        let mut next = self.touched();
        next.edges.retain(|e| &e.id != id);
        Ok(next)
    }

    pub(crate) fn check_endpoints(&self, edge: &Edge) -> Result<(), GraphError> {
        let source = self
            .node(&edge.source)
            .ok_or_else(|| GraphError::Reference {
                edge: edge.id.clone(),
                detail: format!("source node {} does not exist", edge.source),
            })?;
        if !source.has_output(&edge.source_port) {
            return Err(GraphError::Reference {
                edge: edge.id.clone(),
                detail: format!(
                    "source port {} does not exist on node {}",
                    edge.source_port, edge.source
                ),
            });
        }
        let target = self
            .node(&edge.target)
            .ok_or_else(|| GraphError::Reference {
                edge: edge.id.clone(),
                detail: format!("target node {} does not exist", edge.target),
            })?;
        if !target.has_input(&edge.target_port) {
            return Err(GraphError::Reference {
                edge: edge.id.clone(),
                detail: format!(
                    "target port {} does not exist on node {}",
                    edge.target_port, edge.target
                ),
            });
        }
        Ok(())
    }
}

/// Create an empty graph
#[must_use]
pub fn create_graph(name: impl Into<String>, description: impl Into<String>) -> Graph {
    Graph::new(name).with_description(description)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NodeKind;

    fn two_node_graph() -> (Graph, Node, Node) {
        let a = Node::new("A", NodeKind::constant(1.0)).with_id("a");
        let b = Node::new("B", NodeKind::output()).with_id("b");
        let graph = Graph::new("g")
            .add_node(a.clone())
            .unwrap()
            .add_node(b.clone())
            .unwrap();
        (graph, a, b)
    }

    #[test]
    fn test_updates_return_new_graph() {
        let (graph, a, b) = two_node_graph();
        let edge = Edge::connect(&a, "value", &b, "value").unwrap();
        let wired = graph.add_edge(edge).unwrap();

        assert_eq!(graph.edges.len(), 0, "input graph must not be mutated");
        assert_eq!(wired.edges.len(), 1);
        assert_eq!(wired.version, graph.version + 1);
        assert!(wired.updated_at >= graph.updated_at);
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let (graph, a, _) = two_node_graph();
        let err = graph.add_node(a).unwrap_err();
        assert!(matches!(err, GraphError::DuplicateNode(id) if id.as_str() == "a"));
    }

    #[test]
    fn test_add_edge_reference_errors() {
        let (graph, a, b) = two_node_graph();

        let missing_node = Edge::new("a", a.outputs[0].id.clone(), "nope", "p");
        assert!(matches!(
            graph.add_edge(missing_node),
            Err(GraphError::Reference { .. })
        ));

        let missing_port = Edge::new("a", "bogus", "b", b.inputs[0].id.clone());
        let err = graph.add_edge(missing_port).unwrap_err();
        assert!(err.to_string().contains("bogus"));
    }

    #[test]
    fn test_remove_node_cascades_edges() {
        let (graph, a, b) = two_node_graph();
        let graph = graph
            .add_edge(Edge::connect(&a, "value", &b, "value").unwrap())
            .unwrap();
        let pruned = graph.remove_node(&a.id).unwrap();
        assert_eq!(pruned.nodes.len(), 1);
        assert!(pruned.edges.is_empty());
        assert!(matches!(
            pruned.remove_node(&a.id),
            Err(GraphError::NodeNotFound(_))
        ));
    }

    #[test]
    fn test_update_node_keeps_id() {
        let (graph, a, _) = two_node_graph();
        let updated = graph
            .update_node(&a.id, |n| {
                n.name = "Renamed".to_string();
                n.id = NodeId::from("hijack");
            })
            .unwrap();
        let node = updated.node(&a.id).unwrap();
        assert_eq!(node.name, "Renamed");
        assert_eq!(graph.node(&a.id).unwrap().name, "A");
    }

    #[test]
    fn test_update_node_rejects_dropping_wired_port() {
        let (graph, a, b) = two_node_graph();
        let graph = graph
            .add_edge(Edge::connect(&a, "value", &b, "value").unwrap())
            .unwrap();

        let err = graph.update_node(&b.id, |n| n.inputs.clear()).unwrap_err();
        assert!(matches!(err, GraphError::Reference { .. }), "{err}");
        let err = graph.update_node(&a.id, |n| n.outputs.clear()).unwrap_err();
        assert!(err.to_string().contains("source port"), "{err}");

        // unwired nodes may reshape their ports freely
        let (loose, _, b) = two_node_graph();
        assert!(loose.update_node(&b.id, |n| n.inputs.clear()).is_ok());
    }

    #[test]
    fn test_remove_edge() {
        let (graph, a, b) = two_node_graph();
        let edge = Edge::connect(&a, "value", &b, "value")
            .unwrap()
            .with_id("e1");
        let graph = graph.add_edge(edge).unwrap();
        let graph = graph.remove_edge(&EdgeId::from("e1")).unwrap();
        assert!(graph.edges.is_empty());
        assert!(graph.remove_edge(&EdgeId::from("e1")).is_err());
    }
}
