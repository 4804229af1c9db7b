//! Run configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::model::{GraphId, NodeId, Value};

/// Single pass or repeated stochastic runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionMode {
    Deterministic,
    #[default]
    MonteCarlo,
}

fn default_iterations() -> usize {
    1000
}

fn default_confidence() -> f64 {
    0.95
}

fn default_time_step() -> f64 {
    1.0
}

/// Configuration of one Monte Carlo run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph_id: Option<GraphId>,
    #[serde(default)]
    pub mode: ExecutionMode,
    /// Ignored in deterministic mode, which always runs once
    #[serde(default = "default_iterations")]
    pub iterations: usize,
    /// Master seed; drawn from entropy and reported back when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Wall-clock budget checked between iterations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_execution_time_ms: Option<u64>,
    /// Worker threads for parallel runs; 1 forces a sequential run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_parallelism: Option<usize>,
    /// OUTPUT nodes to record; all of them when empty
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output_node_ids: Vec<NodeId>,
    /// Keep every node's value for every iteration
    #[serde(default)]
    pub capture_intermediates: bool,
    /// Confidence level for VaR and CVaR
    #[serde(default = "default_confidence")]
    pub confidence_level: f64,
    /// Simulated time advanced per iteration; `$time = iteration * timeStep`
    #[serde(default = "default_time_step")]
    pub time_step: f64,
    /// Run parameters overlaid on the graph's `params`
    #[serde(default, skip_serializing_if = "Value::is_nullish")]
    pub parameters: Value,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            graph_id: None,
            mode: ExecutionMode::default(),
            iterations: default_iterations(),
            seed: None,
            max_execution_time_ms: None,
            max_parallelism: None,
            output_node_ids: Vec::new(),
            capture_intermediates: false,
            confidence_level: default_confidence(),
            time_step: default_time_step(),
            parameters: Value::Undefined,
        }
    }
}

impl SimulationConfig {
    #[must_use]
    pub fn new(iterations: usize) -> Self {
        Self {
            iterations,
            ..Self::default()
        }
    }

    /// A single deterministic pass
    #[must_use]
    pub fn deterministic() -> Self {
        Self {
            mode: ExecutionMode::Deterministic,
            iterations: 1,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.max_execution_time_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    #[must_use]
    pub fn with_max_parallelism(mut self, threads: usize) -> Self {
        self.max_parallelism = Some(threads);
        self
    }

    #[must_use]
    pub fn with_outputs(mut self, ids: impl IntoIterator<Item = impl Into<NodeId>>) -> Self {
        self.output_node_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn capturing_intermediates(mut self) -> Self {
        self.capture_intermediates = true;
        self
    }

    #[must_use]
    pub fn with_confidence_level(mut self, level: f64) -> Self {
        self.confidence_level = level;
        self
    }

    #[must_use]
    pub fn with_time_step(mut self, time_step: f64) -> Self {
        self.time_step = time_step;
        self
    }

    #[must_use]
    pub fn with_parameters(mut self, parameters: impl Into<Value>) -> Self {
        self.parameters = parameters.into();
        self
    }

    /// Number of iterations this configuration actually runs
    #[must_use]
    pub fn effective_iterations(&self) -> usize {
        match self.mode {
            ExecutionMode::Deterministic => 1,
            ExecutionMode::MonteCarlo => self.iterations,
        }
    }
}
