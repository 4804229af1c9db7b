//! Expression syntax tree

use crate::model::Value;

/// Variable namespaces addressable with a `$` sigil
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Root {
    /// Current node's `data` payload
    Node,
    /// Values on the current node's input ports, keyed by port name
    Inputs,
    /// Graph-level parameters
    Params,
    Time,
    Iteration,
    /// Last computed values of other nodes, keyed by node id
    Nodes,
    /// Value travelling along an edge (edge `condition`/`transform` only)
    Value,
}

impl Root {
    pub(crate) fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "node" => Root::Node,
            "inputs" => Root::Inputs,
            "params" => Root::Params,
            "time" => Root::Time,
            "iteration" => Root::Iteration,
            "nodes" => Root::Nodes,
            "value" => Root::Value,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Mul,
    Div,
    Mod,
    Add,
    Sub,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

/// One step of a member-access chain
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Field(String),
    Index(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Root(Root),
    /// Bare identifier: shorthand for `$inputs.<name>`, then `$params.<name>`
    Ident(String),
    Access {
        base: Box<Expr>,
        path: Vec<Segment>,
    },
    Unary(UnaryOp, Box<Expr>),
    /// Left-associative run of operators sharing one precedence level,
    /// kept flat so long chains evaluate in a loop rather than by recursion
    Chain {
        first: Box<Expr>,
        rest: Vec<(BinaryOp, Expr)>,
    },
    /// Short-circuiting `&&` / `||` over two or more operands
    Logical {
        op: LogicalOp,
        operands: Vec<Expr>,
    },
    Ternary {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
}
