mod distribution;
mod graph;
mod ids;
mod node;
mod value;

pub use distribution::DistributionSpec;
pub use graph::{Edge, EdgeKind, Graph, create_graph};
pub use ids::{EdgeId, GraphId, NodeId, PortId};
pub use node::{
    AggregationMethod, AggregatorData, ConstantData, ConstraintData, ConstraintMode,
    DecisionData, FilterData, IntegratorData, Node, NodeKind, OutputData, ParameterData, PidData,
    Port, PortType, Position, StateMachineData, SubgraphData, TransformerData, Transition,
};
pub use value::{Value, format_number};
