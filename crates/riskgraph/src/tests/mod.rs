//! Integration-style tests for the command-line boundary


use riskgraph_core::model::{DistributionSpec, Port};
use riskgraph_core::{Edge, Graph, Node, NodeKind};

fn node(id: &str, kind: NodeKind) -> Node {
    Node::new(id, kind).with_id(id)
}

/// `demand ~ normal(100, 15)` times a `price` parameter, recorded at `out`
pub(crate) fn demand_graph() -> Graph {
    let demand = node("demand", NodeKind::Distribution(DistributionSpec::normal(100.0, 15.0)));
    let price = node("price", NodeKind::parameter(4.0));
    let revenue = node("revenue", NodeKind::transformer("value * price"))
        .with_inputs(vec![Port::number("value"), Port::number("price")]);
    let out = node("out", NodeKind::output());

    Graph::new("demand")
        .add_node(demand.clone())
        .and_then(|g| g.add_node(price.clone()))
        .and_then(|g| g.add_node(revenue.clone()))
        .and_then(|g| g.add_node(out.clone()))
        .and_then(|g| g.add_edge(Edge::connect(&demand, "value", &revenue, "value")?))
        .and_then(|g| g.add_edge(Edge::connect(&price, "value", &revenue, "price")?))
        .and_then(|g| g.add_edge(Edge::connect(&revenue, "value", &out, "value")?))
        .unwrap()
}
