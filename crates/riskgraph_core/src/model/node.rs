//! Nodes, ports and the per-type node payloads
//!
//! A node's type and its `data` payload travel together as one closed enum,
//! `NodeKind`, serialized adjacently as `{"type": "TRANSFORMER", "data": {...}}`.
//! Each variant carries exactly the fields its evaluation needs, so the engine's
//! per-type dispatch is an exhaustive match.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use super::distribution::DistributionSpec;
use super::graph::Graph;
use super::ids::{NodeId, PortId};
use super::value::Value;

pub(crate) fn now() -> Timestamp {
    Timestamp::now()
}

/// Declared data type of a port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortType {
    Number,
    String,
    Boolean,
    Array,
    Object,
    #[default]
    Any,
}

/// A named connection point on a node. Edges address ports by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Port {
    pub id: PortId,
    pub name: String,
    #[serde(default)]
    pub data_type: PortType,
    #[serde(default)]
    pub required: bool,
    /// Accepts fan-in: every incoming edge contributes one list element
    #[serde(default)]
    pub multiple: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
}

impl Port {
    #[must_use]
    pub fn new(name: impl Into<String>, data_type: PortType) -> Self {
        Self {
            id: PortId::generate(),
            name: name.into(),
            data_type,
            required: false,
            multiple: false,
            default_value: None,
        }
    }

    #[must_use]
    pub fn number(name: impl Into<String>) -> Self {
        Self::new(name, PortType::Number)
    }

    #[must_use]
    pub fn any(name: impl Into<String>) -> Self {
        Self::new(name, PortType::Any)
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub fn multiple(mut self) -> Self {
        self.multiple = true;
        self
    }

    #[must_use]
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }
}

/// Canvas position. Presentation only; the engine never reads it.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstantData {
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterData {
    pub value: Value,
    /// Name used to bind run-time parameter overrides; falls back to the node id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformerData {
    pub expression: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationMethod {
    #[default]
    Sum,
    Mean,
    Min,
    Max,
    Product,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AggregatorData {
    #[serde(default)]
    pub method: AggregationMethod,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionData {
    pub condition: String,
    /// Returned when the condition is truthy; the condition result itself when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub true_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub false_value: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConstraintMode {
    /// Out-of-bound values are pulled back to the nearest bound
    #[default]
    Clamp,
    /// Values pass through unchanged; violations are only recorded
    Validate,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstraintData {
    /// Expression producing the constrained value; `$inputs.value` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default)]
    pub mode: ConstraintMode,
    /// Violations fail the run instead of being recorded
    #[serde(default)]
    pub fatal: bool,
}

fn default_output_key() -> String {
    "value".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputData {
    #[serde(default = "default_output_key")]
    pub output_key: String,
}

impl Default for OutputData {
    fn default() -> Self {
        Self {
            output_key: default_output_key(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubgraphData {
    pub graph: Box<Graph>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegratorData {
    #[serde(default)]
    pub initial_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterData {
    /// Smoothing factor in `[0, 1]`; 1 passes input through unchanged
    pub alpha: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PidData {
    pub setpoint: f64,
    #[serde(default)]
    pub kp: f64,
    #[serde(default)]
    pub ki: f64,
    #[serde(default)]
    pub kd: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_max: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub from: String,
    pub to: String,
    pub condition: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateMachineData {
    pub states: Vec<String>,
    pub initial: String,
    #[serde(default)]
    pub transitions: Vec<Transition>,
}

/// Node type tag together with its payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeKind {
    Constant(ConstantData),
    Parameter(ParameterData),
    Distribution(DistributionSpec),
    Transformer(TransformerData),
    Aggregator(AggregatorData),
    Decision(DecisionData),
    Constraint(ConstraintData),
    Output(OutputData),
    Subgraph(SubgraphData),
    Integrator(IntegratorData),
    Filter(FilterData),
    PidController(PidData),
    StateMachine(StateMachineData),
}

impl NodeKind {
    #[must_use]
    pub fn constant(value: impl Into<Value>) -> Self {
        NodeKind::Constant(ConstantData {
            value: value.into(),
        })
    }

    #[must_use]
    pub fn parameter(value: impl Into<Value>) -> Self {
        NodeKind::Parameter(ParameterData {
            value: value.into(),
            name: None,
            min: None,
            max: None,
        })
    }

    #[must_use]
    pub fn transformer(expression: impl Into<String>) -> Self {
        NodeKind::Transformer(TransformerData {
            expression: expression.into(),
        })
    }

    #[must_use]
    pub fn aggregator(method: AggregationMethod) -> Self {
        NodeKind::Aggregator(AggregatorData { method })
    }

    #[must_use]
    pub fn output() -> Self {
        NodeKind::Output(OutputData::default())
    }

    /// The serialized type tag, e.g. `"TRANSFORMER"`
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            NodeKind::Constant(_) => "CONSTANT",
            NodeKind::Parameter(_) => "PARAMETER",
            NodeKind::Distribution(_) => "DISTRIBUTION",
            NodeKind::Transformer(_) => "TRANSFORMER",
            NodeKind::Aggregator(_) => "AGGREGATOR",
            NodeKind::Decision(_) => "DECISION",
            NodeKind::Constraint(_) => "CONSTRAINT",
            NodeKind::Output(_) => "OUTPUT",
            NodeKind::Subgraph(_) => "SUBGRAPH",
            NodeKind::Integrator(_) => "INTEGRATOR",
            NodeKind::Filter(_) => "FILTER",
            NodeKind::PidController(_) => "PID_CONTROLLER",
            NodeKind::StateMachine(_) => "STATE_MACHINE",
        }
    }

    /// Node types whose output depends on their own previous iterations
    #[must_use]
    pub fn is_stateful(&self) -> bool {
        match self {
            NodeKind::Integrator(_)
            | NodeKind::Filter(_)
            | NodeKind::PidController(_)
            | NodeKind::StateMachine(_) => true,
            NodeKind::Subgraph(data) => data.graph.nodes.iter().any(|n| n.kind.is_stateful()),
            _ => false,
        }
    }

    /// All expression sources carried by this payload, for validation
    #[must_use]
    pub fn expressions(&self) -> Vec<&str> {
        match self {
            NodeKind::Transformer(data) => vec![data.expression.as_str()],
            NodeKind::Decision(data) => vec![data.condition.as_str()],
            NodeKind::Constraint(data) => data.expression.as_deref().into_iter().collect(),
            NodeKind::StateMachine(data) => data
                .transitions
                .iter()
                .map(|t| t.condition.as_str())
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Default input and output ports for a freshly created node of this type
    #[must_use]
    pub fn default_ports(&self) -> (Vec<Port>, Vec<Port>) {
        let value_out = || vec![Port::any("value")];
        match self {
            NodeKind::Constant(_) | NodeKind::Parameter(_) | NodeKind::Distribution(_) => {
                (Vec::new(), value_out())
            }
            NodeKind::Transformer(_) | NodeKind::Decision(_) | NodeKind::StateMachine(_) => {
                (vec![Port::any("value")], value_out())
            }
            NodeKind::Aggregator(_) => (vec![Port::number("values").multiple()], value_out()),
            NodeKind::Constraint(_) | NodeKind::Filter(_) => {
                (vec![Port::number("value").required()], value_out())
            }
            NodeKind::Output(_) => (vec![Port::any("value").required()], Vec::new()),
            NodeKind::Integrator(_) => (vec![Port::number("rate").required()], value_out()),
            NodeKind::PidController(_) => {
                (vec![Port::number("measurement").required()], value_out())
            }
            NodeKind::Subgraph(data) => {
                let inputs = data
                    .graph
                    .nodes
                    .iter()
                    .filter_map(|n| match &n.kind {
                        NodeKind::Parameter(p) => Some(Port::any(
                            p.name.clone().unwrap_or_else(|| n.id.to_string()),
                        )),
                        _ => None,
                    })
                    .collect();
                (inputs, value_out())
            }
        }
    }
}

/// A typed computation node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: NodeId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub position: Position,
    #[serde(flatten)]
    pub kind: NodeKind,
    #[serde(default)]
    pub inputs: Vec<Port>,
    #[serde(default)]
    pub outputs: Vec<Port>,
    #[serde(default = "now")]
    pub created_at: Timestamp,
    #[serde(default = "now")]
    pub updated_at: Timestamp,
}

impl Node {
    /// Create a node with a fresh id and the default ports for its type
    #[must_use]
    pub fn new(name: impl Into<String>, kind: NodeKind) -> Self {
        let (inputs, outputs) = kind.default_ports();
        let ts = now();
        Self {
            id: NodeId::generate(),
            name: name.into(),
            position: Position::default(),
            kind,
            inputs,
            outputs,
            created_at: ts,
            updated_at: ts,
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<NodeId>) -> Self {
        self.id = id.into();
        self
    }

    /// Replace the input ports
    #[must_use]
    pub fn with_inputs(mut self, inputs: Vec<Port>) -> Self {
        self.inputs = inputs;
        self
    }

    #[must_use]
    pub fn with_input(mut self, port: Port) -> Self {
        self.inputs.push(port);
        self
    }

    #[must_use]
    pub fn with_output(mut self, port: Port) -> Self {
        self.outputs.push(port);
        self
    }

    #[must_use]
    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.position = Position { x, y };
        self
    }

    #[must_use]
    pub fn input_port(&self, name: &str) -> Option<&Port> {
        self.inputs.iter().find(|p| p.name == name)
    }

    #[must_use]
    pub fn output_port(&self, name: &str) -> Option<&Port> {
        self.outputs.iter().find(|p| p.name == name)
    }

    #[must_use]
    pub fn has_input(&self, id: &PortId) -> bool {
        self.inputs.iter().any(|p| &p.id == id)
    }

    #[must_use]
    pub fn has_output(&self, id: &PortId) -> bool {
        self.outputs.iter().any(|p| &p.id == id)
    }

    /// The node payload as a dynamic value, as seen by `$node` in expressions
    #[must_use]
    pub fn data_value(&self) -> Value {
        serde_json::to_value(&self.kind)
            .ok()
            .and_then(|mut v| v.get_mut("data").map(serde_json::Value::take))
            .map(Value::from)
            .unwrap_or(Value::Undefined)
    }
}
