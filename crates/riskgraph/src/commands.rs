//! Subcommand implementations
//!
//! Each command takes a loaded graph and returns a serializable report; the
//! binary decides where the JSON goes and which exit code to use.

use color_eyre::eyre::{Result, eyre};
use riskgraph_core::model::{NodeId, Value};
use riskgraph_core::rng::entropy_seed;
use riskgraph_core::topology::detect_cycle;
use riskgraph_core::{
    ExecutionResult, Graph, SensitivityConfig, SensitivityResult, SimulationConfig,
    SimulationProgress, SimulationResult, ValidationResult, execute_graph, export_graph_to_json,
    import_graph_from_json, run_monte_carlo_simulation, run_sensitivity_analysis, set_seed,
    topological_sort, validate_graph,
};
use serde::Serialize;
use tracing::info;

use crate::limits::Limits;

/// Something that reports whether the command achieved what was asked
pub trait Outcome {
    fn succeeded(&self) -> bool;
}

impl Outcome for ValidationResult {
    fn succeeded(&self) -> bool {
        self.valid
    }
}

impl Outcome for ExecutionResult {
    fn succeeded(&self) -> bool {
        self.success
    }
}

impl Outcome for SensitivityResult {
    fn succeeded(&self) -> bool {
        self.success
    }
}

pub fn validate(graph: &Graph) -> ValidationResult {
    let report = validate_graph(graph);
    info!(
        errors = report.errors.len(),
        warnings = report.warnings.len(),
        "validated graph"
    );
    report
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SortedNode {
    pub id: NodeId,
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SortReport {
    pub success: bool,
    pub order: Vec<SortedNode>,
    /// Node ids along one DATA_FLOW cycle when no order exists
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cycle: Option<Vec<NodeId>>,
}

impl Outcome for SortReport {
    fn succeeded(&self) -> bool {
        self.success
    }
}

pub fn sort(graph: &Graph) -> SortReport {
    match topological_sort(graph) {
        Some(nodes) => SortReport {
            success: true,
            order: nodes
                .into_iter()
                .map(|n| SortedNode {
                    id: n.id.clone(),
                    name: n.name.clone(),
                    node_type: n.kind.type_name(),
                })
                .collect(),
            cycle: None,
        },
        None => SortReport {
            success: false,
            order: Vec::new(),
            cycle: detect_cycle(graph),
        },
    }
}

/// One deterministic pass; stochastic nodes draw from `seed` or entropy
pub fn run(graph: &Graph, parameters: &Value, seed: Option<u64>) -> ExecutionResult {
    let seed = seed.unwrap_or_else(entropy_seed);
    info!(seed, "executing graph once");
    execute_graph(graph, parameters, &mut set_seed(seed))
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationReport {
    #[serde(flatten)]
    pub result: SimulationResult,
    /// Samples left out of `results` by the stored-results ceiling
    pub truncated_results: usize,
    /// Iterations actually requested after clamping
    pub requested_iterations: usize,
}

impl Outcome for SimulationReport {
    fn succeeded(&self) -> bool {
        self.result.success
    }
}

pub fn simulate(
    graph: &Graph,
    mut config: SimulationConfig,
    limits: &Limits,
    progress: Option<&SimulationProgress>,
) -> SimulationReport {
    limits.apply(&mut config);
    let mut result = run_monte_carlo_simulation(graph, &config, progress);
    let truncated_results = limits.truncate(&mut result);
    SimulationReport {
        result,
        truncated_results,
        requested_iterations: config.effective_iterations(),
    }
}

/// Sweep one parameter; per-step iterations count against the same ceiling.
///
/// A sweep with more steps than the ceiling allows is refused outright.
pub fn sensitivity(
    graph: &Graph,
    mut config: SensitivityConfig,
    limits: &Limits,
    progress: Option<&SimulationProgress>,
) -> SensitivityResult {
    let ceiling = limits.max_simulation_iterations;
    if config.steps > ceiling {
        tracing::warn!(steps = config.steps, ceiling, "sensitivity sweep refused");
        return SensitivityResult {
            success: false,
            seed: config.seed.unwrap_or_default(),
            error: Some(format!(
                "sweep of {} steps exceeds the iteration limit of {ceiling}",
                config.steps
            )),
            ..SensitivityResult::default()
        };
    }
    let total = config.steps.saturating_mul(config.iterations.max(1));
    if total > ceiling {
        let per_step = (ceiling / config.steps.max(1)).max(1);
        tracing::warn!(
            requested = config.iterations,
            per_step,
            "clamping sensitivity iterations per step"
        );
        config.iterations = per_step;
    }
    run_sensitivity_analysis(graph, &config, progress)
}

/// Wrap the graph in the versioned export envelope
pub fn export(graph: &Graph) -> Result<String> {
    export_graph_to_json(graph).map_err(|e| eyre!("export failed: {e}"))
}

/// Read an export (or bare graph) and give everything fresh ids
pub fn import(json: &str) -> Result<Graph> {
    import_graph_from_json(json).map_err(|e| eyre!("import failed: {e}"))
}
