use crate::model::{EdgeId, NodeId};

/// Errors raised by graph mutation, lookup and import.
///
/// These indicate a programming or input error and surface immediately.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GraphError {
    #[error("node {0} already exists")]
    DuplicateNode(NodeId),

    #[error("edge {0} already exists")]
    DuplicateEdge(EdgeId),

    #[error("node {0} not found")]
    NodeNotFound(NodeId),

    #[error("edge {0} not found")]
    EdgeNotFound(EdgeId),

    #[error("node {node} has no port named {port}")]
    PortNotFound { node: NodeId, port: String },

    /// Edge endpoint or port does not exist
    #[error("invalid reference in edge {edge}: {detail}")]
    Reference { edge: EdgeId, detail: String },

    #[error("unsupported export version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("malformed graph document: {0}")]
    Import(String),
}

impl From<serde_json::Error> for GraphError {
    fn from(err: serde_json::Error) -> Self {
        GraphError::Import(err.to_string())
    }
}

/// Malformed expression source
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message} at offset {offset}")]
pub struct ParseError {
    pub message: String,
    /// Byte offset into the source where the problem was detected
    pub offset: usize,
}

impl ParseError {
    pub(crate) fn new(message: impl Into<String>, offset: usize) -> Self {
        Self {
            message: message.into(),
            offset,
        }
    }
}

/// Failures while evaluating a well-formed expression
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error("unknown function {0}()")]
    UnknownFunction(String),

    #[error("{name}() expects {expected} argument(s), got {found}")]
    Arity {
        name: String,
        expected: &'static str,
        found: usize,
    },

    #[error("{name}(): {reason}")]
    InvalidArgument { name: String, reason: String },
}

/// Either stage of expression handling failed
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExpressionError {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("evaluation error: {0}")]
    Eval(#[from] EvalError),
}

/// Invalid distribution parameters
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("invalid {distribution} parameters: {reason}")]
pub struct DistributionError {
    pub distribution: &'static str,
    pub reason: &'static str,
}

/// Failures of a graph execution or simulation run.
///
/// These are captured into `success: false` results rather than propagated,
/// since a failed run is an expected outcome callers branch on.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExecutionError {
    #[error("cycle detected among data-flow edges")]
    Cycle,

    #[error("invalid graph: {0}")]
    InvalidGraph(String),

    #[error("node {node_id}: {source}")]
    Expression {
        node_id: NodeId,
        #[source]
        source: ExpressionError,
    },

    #[error("node {node_id}: required input '{port}' has no value")]
    MissingInput { node_id: NodeId, port: String },

    #[error("node {node_id}: {message}")]
    Evaluation { node_id: NodeId, message: String },

    #[error("node {node_id}: {source}")]
    InvalidDistribution {
        node_id: NodeId,
        #[source]
        source: DistributionError,
    },

    #[error("node {node_id}: constraint violated ({value} outside [{min}, {max}])")]
    ConstraintViolated {
        node_id: NodeId,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("timeout")]
    Timeout { completed: usize },

    #[error("cancelled")]
    Cancelled,
}

impl ExecutionError {
    /// The node that failed, when the failure is node-level
    #[must_use]
    pub fn node_id(&self) -> Option<&NodeId> {
        match self {
            ExecutionError::Expression { node_id, .. }
            | ExecutionError::MissingInput { node_id, .. }
            | ExecutionError::Evaluation { node_id, .. }
            | ExecutionError::InvalidDistribution { node_id, .. }
            | ExecutionError::ConstraintViolated { node_id, .. } => Some(node_id),
            _ => None,
        }
    }
}

/// Sensitivity sweep set-up errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SensitivityError {
    #[error("node {0} not found")]
    NodeNotFound(NodeId),

    #[error("cannot set field '{field}' on node {node_id}: {reason}")]
    InvalidField {
        node_id: NodeId,
        field: String,
        reason: String,
    },

    #[error("sweep needs at least one step")]
    NoSteps,

    /// Bounds must be finite with `lo <= hi`
    #[error("invalid sweep range [{0}, {1}]")]
    InvalidRange(f64, f64),

    #[error("node {node_id} has no output field '{field}'")]
    OutputField { node_id: NodeId, field: String },

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error("cancelled")]
    Cancelled,
}
