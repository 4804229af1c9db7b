//! Scenario-modeling graph execution kernel
//!
//! This crate evaluates directed graphs of typed computation nodes. It supports:
//! - Immutable graph values with typed node payloads and port-level wiring
//! - A small expression language for transformers, decisions and edge logic
//! - Deterministic single-pass execution in topological order
//! - Seeded Monte Carlo runs aggregated into risk metrics (VaR, CVaR, percentiles)
//! - One-parameter sensitivity sweeps
//! - FEEDBACK edges carrying values across iterations, with convergence reports
//!
//! ```ignore
//! use riskgraph_core::{Edge, Graph, Node, NodeKind, SimulationConfig, run_monte_carlo_simulation};
//! use riskgraph_core::model::DistributionSpec;
//!
//! let demand = Node::new("Demand", NodeKind::Distribution(DistributionSpec::normal(100.0, 15.0)));
//! let out = Node::new("Result", NodeKind::output());
//! let graph = Graph::new("demo")
//!     .add_node(demand.clone())?
//!     .add_node(out.clone())?
//!     .add_edge(Edge::connect(&demand, "value", &out, "value")?)?;
//!
//! let result = run_monte_carlo_simulation(&graph, &SimulationConfig::new(10_000).with_seed(42), None);
//! ```

#![warn(clippy::all)]

// ============================================================================
// Core modules
// ============================================================================

pub mod analysis;
pub mod engine;
pub mod error;
pub mod expr;
pub mod interchange;
pub mod rng;
pub mod simulation;
pub mod statistics;
pub mod topology;
pub mod validation;

// ============================================================================
// Type definition modules
// ============================================================================

pub mod config;
pub mod model;

// ============================================================================
// Test modules
// ============================================================================

#[cfg(test)]
mod tests;

// ============================================================================
// Public re-exports for convenience
// ============================================================================

pub use analysis::{SensitivityConfig, SensitivityResult, run_sensitivity_analysis};
pub use config::{ExecutionMode, SimulationConfig};
pub use engine::{ExecutionResult, execute_graph};
pub use error::{ExecutionError, GraphError};
pub use interchange::{clone_graph, export_graph_to_json, import_graph_from_json};
pub use model::{Edge, EdgeKind, Graph, Node, NodeKind, Value, create_graph};
pub use rng::set_seed;
pub use simulation::{SimulationProgress, SimulationResult, run_monte_carlo_simulation};
pub use statistics::RiskMetrics;
pub use topology::{has_cycle, topological_sort};
pub use validation::{ValidationResult, validate_graph};
