//! Graph duplication and the versioned JSON exchange format

use jiff::Timestamp;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::GraphError;
use crate::model::{EdgeId, Graph, GraphId, NodeId, NodeKind, PortId};

/// Envelope version written by [`export_graph_to_json`]
pub const EXPORT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphExport {
    pub version: u32,
    pub exported_at: Timestamp,
    pub graph: Graph,
}

/// Copy a graph giving every node, port and edge a fresh id.
///
/// Edges are rewired through the id map, so the copy is structurally
/// identical to the original and shares no identifiers with it. Port ids are
/// only unique within their node and are remapped per node. An unnamed
/// PARAMETER takes its old id as its name so parameter overrides keyed by
/// that id still bind. Graphs embedded in SUBGRAPH nodes keep their ids; they
/// form their own scope.
#[must_use]
pub fn clone_graph(graph: &Graph) -> Graph {
    let mut node_ids: FxHashMap<NodeId, NodeId> = FxHashMap::default();
    let mut port_ids: FxHashMap<(NodeId, PortId), PortId> = FxHashMap::default();

    let mut copy = graph.clone();
    copy.id = GraphId::generate();
    copy.version = 1;
    let ts = Timestamp::now();
    copy.created_at = ts;
    copy.updated_at = ts;

    for node in &mut copy.nodes {
        let old = std::mem::replace(&mut node.id, NodeId::generate());
        if let NodeKind::Parameter(data) = &mut node.kind
            && data.name.is_none()
        {
            data.name = Some(old.as_str().to_string());
        }
        for port in node.inputs.iter_mut().chain(node.outputs.iter_mut()) {
            let fresh = PortId::generate();
            port_ids
                .entry((old.clone(), port.id.clone()))
                .or_insert_with(|| fresh.clone());
            port.id = fresh;
        }
        node_ids.entry(old).or_insert_with(|| node.id.clone());
    }

    let remap_port = |node: &NodeId, port: &PortId| {
        port_ids
            .get(&(node.clone(), port.clone()))
            .cloned()
            .unwrap_or_else(|| port.clone())
    };
    for edge in &mut copy.edges {
        edge.id = EdgeId::generate();
        edge.source_port = remap_port(&edge.source, &edge.source_port);
        edge.target_port = remap_port(&edge.target, &edge.target_port);
        if let Some(id) = node_ids.get(&edge.source) {
            edge.source = id.clone();
        }
        if let Some(id) = node_ids.get(&edge.target) {
            edge.target = id.clone();
        }
    }

    copy
}

/// Serialize a graph inside a `{version, exportedAt, graph}` envelope
pub fn export_graph_to_json(graph: &Graph) -> Result<String, GraphError> {
    let envelope = GraphExport {
        version: EXPORT_VERSION,
        exported_at: Timestamp::now(),
        graph: graph.clone(),
    };
    Ok(serde_json::to_string_pretty(&envelope)?)
}

/// Read an exported graph and give it fresh ids.
///
/// A bare graph document without the envelope is accepted as well.
pub fn import_graph_from_json(json: &str) -> Result<Graph, GraphError> {
    let doc: serde_json::Value = serde_json::from_str(json)?;
    let graph: Graph = if doc.get("graph").is_some() {
        let envelope: GraphExport = serde_json::from_value(doc)?;
        if envelope.version > EXPORT_VERSION {
            return Err(GraphError::UnsupportedVersion {
                found: envelope.version,
                expected: EXPORT_VERSION,
            });
        }
        envelope.graph
    } else {
        serde_json::from_value(doc)?
    };
    Ok(clone_graph(&graph))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AggregationMethod, Edge, Node, NodeKind, Value};

    fn sample() -> Graph {
        let a = Node::new("a", NodeKind::constant(2.0));
        let b = Node::new("sum", NodeKind::aggregator(AggregationMethod::Sum));
        let out = Node::new("out", NodeKind::output());
        let mut graph = Graph::new("sample")
            .with_params(serde_json::json!({"rate": 0.1}))
            .add_node(a.clone())
            .unwrap()
            .add_node(b.clone())
            .unwrap()
            .add_node(out.clone())
            .unwrap()
            .add_edge(Edge::connect(&a, "value", &b, "values").unwrap())
            .unwrap()
            .add_edge(Edge::connect(&b, "value", &out, "value").unwrap())
            .unwrap();
        graph.metadata.insert("owner".into(), Value::from("risk"));
        graph
    }

    #[test]
    fn test_clone_is_identity_disjoint() {
        let graph = sample();
        let copy = clone_graph(&graph);
        assert_ne!(copy.id, graph.id);
        for (orig, new) in graph.nodes.iter().zip(&copy.nodes) {
            assert_ne!(orig.id, new.id);
            assert_eq!(orig.name, new.name);
            assert_eq!(orig.data_value(), new.data_value());
            let ports = orig.inputs.iter().chain(&orig.outputs);
            for (p, q) in ports.zip(new.inputs.iter().chain(&new.outputs)) {
                assert_ne!(p.id, q.id);
                assert_eq!(p.name, q.name);
            }
        }
        for edge in &copy.edges {
            copy.check_endpoints(edge).unwrap();
            assert!(graph.edge(&edge.id).is_none());
        }
    }

    #[test]
    fn test_export_import_round_trip() {
        let graph = sample();
        let json = export_graph_to_json(&graph).unwrap();
        assert!(json.contains("\"exportedAt\""));
        let back = import_graph_from_json(&json).unwrap();
        assert_eq!(back.nodes.len(), graph.nodes.len());
        assert_eq!(back.edges.len(), graph.edges.len());
        assert_eq!(back.params, graph.params);
        assert_eq!(back.metadata, graph.metadata);
        let names: Vec<_> = back.nodes.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["a", "sum", "out"]);
        assert!(crate::validation::validate_graph(&back).valid);
    }

    #[test]
    fn test_rejects_future_versions() {
        let graph = sample();
        let json = export_graph_to_json(&graph)
            .unwrap()
            .replacen("\"version\": 1", "\"version\": 99", 1);
        assert!(matches!(
            import_graph_from_json(&json),
            Err(GraphError::UnsupportedVersion { found: 99, .. })
        ));
    }

    #[test]
    fn test_malformed_document() {
        assert!(matches!(
            import_graph_from_json("{not json"),
            Err(GraphError::Import(_))
        ));
    }
}
