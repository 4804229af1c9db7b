//! Integration tests for the riskgraph engine
//!
//! Tests are organized by topic:
//! - `topology` - Ordering and cycle detection
//! - `execution` - Single-pass semantics of each node type and edge option
//! - `monte_carlo` - Seeded runs, statistics, parallel equivalence, early stops
//! - `feedback` - FEEDBACK edges, stateful nodes and convergence
//! - `sensitivity` - Parameter sweeps
//! - `interchange` - Export, import and validation of whole graphs

mod feedback;
mod monte_carlo;
mod sensitivity;
mod topology;

use crate::model::{Edge, Graph, Node, NodeId, NodeKind};

/// Node whose id equals its name
pub(super) fn node(id: &str, kind: NodeKind) -> Node {
    Node::new(id, kind).with_id(id)
}

pub(super) fn graph_of(nodes: Vec<Node>) -> Graph {
    nodes.into_iter().fold(Graph::new("test"), |graph, node| {
        graph.add_node(node).expect("unique node ids")
    })
}

/// Edge between two named ports of nodes already in `graph`
pub(super) fn link(graph: &Graph, from: &str, from_port: &str, to: &str, to_port: &str) -> Edge {
    let source = graph.node(&NodeId::from(from)).expect("source node");
    let target = graph.node(&NodeId::from(to)).expect("target node");
    Edge::connect(source, from_port, target, to_port).expect("ports exist")
}

/// Add a `value` -> `value` edge
pub(super) fn wire(graph: Graph, from: &str, to: &str) -> Graph {
    let edge = link(&graph, from, "value", to, "value");
    graph.add_edge(edge).expect("valid edge")
}
