//! Expression language used by transformer, decision and constraint nodes
//! and by edge conditions and transforms.
//!
//! Sources are tokenized, parsed into an [`Expr`] tree once, then evaluated
//! against an [`ExpressionContext`]. Randomness comes only from the generator
//! passed to [`evaluate`], so evaluation is reproducible for a given seed.

mod ast;
mod cache;
mod eval;
mod functions;
mod lexer;
mod parser;

pub use ast::{BinaryOp, Expr, LogicalOp, Root, Segment, UnaryOp};
pub use cache::ExpressionCache;
pub use eval::{ExpressionContext, NodeValues};
pub use functions::BUILTIN_FUNCTIONS;
pub use parser::{MAX_NESTING_DEPTH, parse};

use rand::RngCore;

use crate::error::{EvalError, ExpressionError};
use crate::model::Value;

/// Evaluate a parsed expression
pub fn evaluate(
    expr: &Expr,
    ctx: &ExpressionContext<'_>,
    rng: &mut dyn RngCore,
) -> Result<Value, EvalError> {
    eval::Evaluator::new(ctx, rng).eval(expr)
}

/// Parse and evaluate in one step
pub fn evaluate_str(
    src: &str,
    ctx: &ExpressionContext<'_>,
    rng: &mut dyn RngCore,
) -> Result<Value, ExpressionError> {
    let expr = parse(src)?;
    Ok(evaluate(&expr, ctx, rng)?)
}

/// Names of functions called anywhere in `expr` that are not built in
#[must_use]
pub fn unknown_functions(expr: &Expr) -> Vec<String> {
    let mut out = Vec::new();
    let mut stack = vec![expr];
    while let Some(e) = stack.pop() {
        match e {
            Expr::Literal(_) | Expr::Root(_) | Expr::Ident(_) => {}
            Expr::Access { base, path } => {
                stack.push(base);
                for seg in path {
                    if let Segment::Index(idx) = seg {
                        stack.push(idx);
                    }
                }
            }
            Expr::Unary(_, operand) => stack.push(operand),
            Expr::Chain { first, rest } => {
                stack.push(first);
                stack.extend(rest.iter().map(|(_, e)| e));
            }
            Expr::Logical { operands, .. } => stack.extend(operands.iter()),
            Expr::Ternary {
                cond,
                then,
                otherwise,
            } => {
                stack.push(cond);
                stack.push(then);
                stack.push(otherwise);
            }
            Expr::Call { name, args } => {
                if !BUILTIN_FUNCTIONS.contains(&name.as_str()) && !out.contains(name) {
                    out.push(name.clone());
                }
                stack.extend(args.iter());
            }
        }
    }
    out
}
