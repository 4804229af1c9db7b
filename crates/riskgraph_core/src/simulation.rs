//! Monte Carlo driver
//!
//! Runs a compiled graph for many iterations, each on its own random
//! sub-stream, and aggregates OUTPUT samples into [`RiskMetrics`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use rand::SeedableRng;
use rand::rngs::SmallRng;
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::SimulationConfig;
use crate::engine::{
    ConstraintViolation, ConvergenceReport, ExecutionPlan, Executor, OutputValue,
};
use crate::error::ExecutionError;
use crate::model::{Graph, NodeId, NodeKind, Value};
use crate::rng::{entropy_seed, iteration_seeds};
use crate::statistics::RiskMetrics;

/// Payload handed to a progress callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressUpdate {
    /// Whole percent complete, 1 to 100
    pub progress: usize,
    pub completed: usize,
    pub total: usize,
}

pub type ProgressCallback = Arc<dyn Fn(ProgressUpdate) + Send + Sync>;

/// Progress tracking and cancellation for a Monte Carlo run
#[derive(Clone)]
pub struct SimulationProgress {
    /// Completed iterations counter
    completed: Arc<AtomicUsize>,
    /// Total iterations
    total: Arc<AtomicUsize>,
    /// Cancellation flag
    cancelled: Arc<AtomicBool>,
    /// Last percentage reported to the callback
    last_percent: Arc<AtomicUsize>,
    callback: Option<ProgressCallback>,
}

impl SimulationProgress {
    /// Create a new progress tracker
    #[must_use]
    pub fn new() -> Self {
        Self {
            completed: Arc::new(AtomicUsize::new(0)),
            total: Arc::new(AtomicUsize::new(0)),
            cancelled: Arc::new(AtomicBool::new(false)),
            last_percent: Arc::new(AtomicUsize::new(0)),
            callback: None,
        }
    }

    /// Invoke `callback` each time the whole percentage advances
    #[must_use]
    pub fn with_callback(mut self, callback: impl Fn(ProgressUpdate) + Send + Sync + 'static) -> Self {
        self.callback = Some(Arc::new(callback));
        self
    }

    /// Get the number of completed iterations
    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }

    /// Get the total number of iterations
    #[must_use]
    pub fn total(&self) -> usize {
        self.total.load(Ordering::Relaxed)
    }

    /// Increment the completed counter, notifying the callback on a new percent
    pub fn increment(&self) {
        let done = self.completed.fetch_add(1, Ordering::Relaxed) + 1;
        let total = self.total();
        let Some(callback) = &self.callback else {
            return;
        };
        if total == 0 {
            return;
        }
        let percent = (done.min(total) * 100) / total;
        if percent > self.last_percent.fetch_max(percent, Ordering::Relaxed) {
            callback(ProgressUpdate {
                progress: percent,
                completed: done,
                total,
            });
        }
    }

    /// Reset the progress for a run of `total` iterations
    pub fn reset(&self, total: usize) {
        self.completed.store(0, Ordering::Relaxed);
        self.total.store(total, Ordering::Relaxed);
        self.last_percent.store(0, Ordering::Relaxed);
    }

    /// Cancel the run at the next iteration boundary
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Check if cancelled
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

impl Default for SimulationProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SimulationProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulationProgress")
            .field("completed", &self.completed())
            .field("total", &self.total())
            .field("cancelled", &self.is_cancelled())
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

/// One OUTPUT value from one iteration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleRecord {
    pub node_id: NodeId,
    pub output_key: String,
    pub value: Value,
    pub iteration: usize,
}

/// Outcome of [`run_monte_carlo_simulation`]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResult {
    pub success: bool,
    /// Iterations that completed, including on early stops
    pub iterations: usize,
    pub results: Vec<SampleRecord>,
    /// Metrics per `nodeId:outputKey`
    pub aggregated: BTreeMap<String, RiskMetrics>,
    pub execution_time_ms: u64,
    /// Master seed actually used
    pub seed: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_iteration: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_node: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraint_violations: Vec<ConstraintViolation>,
    /// Advisory status of each FEEDBACK edge
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub convergence: Vec<ConvergenceReport>,
    /// Every node's value per iteration, when requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intermediates: Option<Vec<BTreeMap<String, Value>>>,
}

impl SimulationResult {
    /// Key used in [`SimulationResult::aggregated`]
    #[must_use]
    pub fn key(node_id: &NodeId, output_key: &str) -> String {
        format!("{node_id}:{output_key}")
    }

    /// Metrics for the first output recorded from `node_id`
    #[must_use]
    pub fn metrics(&self, node_id: &str) -> Option<&RiskMetrics> {
        let record = self.results.iter().find(|r| r.node_id.as_str() == node_id)?;
        self.aggregated
            .get(&Self::key(&record.node_id, &record.output_key))
    }

    /// Numeric samples of `node_id` in iteration order
    #[must_use]
    pub fn samples(&self, node_id: &str) -> Vec<f64> {
        self.results
            .iter()
            .filter(|r| r.node_id.as_str() == node_id)
            .map(|r| r.value.to_number())
            .collect()
    }
}

/// What one completed iteration produced
#[derive(Debug, Default)]
struct IterationRecord {
    outputs: Vec<OutputValue>,
    violations: Vec<ConstraintViolation>,
    intermediates: Option<BTreeMap<String, Value>>,
}

#[derive(Debug)]
enum Stop {
    Timeout,
    Cancelled,
    Failed {
        iteration: usize,
        error: ExecutionError,
    },
}

#[derive(Debug, Default)]
struct Run {
    records: Vec<IterationRecord>,
    stop: Option<Stop>,
    convergence: Vec<ConvergenceReport>,
}

/// Shared inputs of every iteration of one run
struct Driver<'a> {
    plan: &'a ExecutionPlan<'a>,
    config: &'a SimulationConfig,
    deadline: Option<Instant>,
    progress: Option<&'a SimulationProgress>,
}

impl Driver<'_> {
    fn executor(&self) -> Executor<'_> {
        Executor::new(self.plan)
            .with_parameters(&self.config.parameters)
            .with_time_step(self.config.time_step)
    }

    /// Deadline and cancellation check at an iteration boundary
    fn interrupted(&self) -> Option<Stop> {
        if self.progress.is_some_and(SimulationProgress::is_cancelled) {
            return Some(Stop::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(Stop::Timeout),
            _ => None,
        }
    }

    fn run_one(
        &self,
        executor: &mut Executor<'_>,
        iteration: usize,
        seed: u64,
    ) -> Result<IterationRecord, ExecutionError> {
        let mut rng = SmallRng::seed_from_u64(seed);
        let output = executor.step(iteration, &mut rng)?;
        if let Some(progress) = self.progress {
            progress.increment();
        }
        Ok(IterationRecord {
            outputs: output.outputs,
            violations: output.violations,
            intermediates: self
                .config
                .capture_intermediates
                .then(|| executor.node_values()),
        })
    }

    fn run_sequential(&self, seeds: &[u64]) -> Run {
        let mut executor = self.executor();
        let mut run = Run::default();
        for (iteration, &seed) in seeds.iter().enumerate() {
            if let Some(stop) = self.interrupted() {
                run.stop = Some(stop);
                break;
            }
            match self.run_one(&mut executor, iteration, seed) {
                Ok(record) => run.records.push(record),
                Err(error) => {
                    run.stop = Some(Stop::Failed { iteration, error });
                    break;
                }
            }
        }
        run.convergence = executor.convergence();
        run
    }

    /// Batches of iterations on a rayon pool.
    ///
    /// Only valid for plans without iteration-to-iteration memory. The merged
    /// run is the contiguous prefix of completed iterations, so it matches the
    /// sequential path for the same seeds.
    #[cfg(feature = "parallel")]
    fn run_parallel(&self, seeds: &[u64]) -> Run {
        const MAX_BATCH_SIZE: usize = 100;
        let first_failure = AtomicUsize::new(usize::MAX);

        let run_batch = |(batch, chunk): (usize, &[u64])| {
            let mut executor = self.executor();
            let mut records = Vec::with_capacity(chunk.len());
            for (offset, &seed) in chunk.iter().enumerate() {
                let iteration = batch * MAX_BATCH_SIZE + offset;
                if iteration > first_failure.load(Ordering::Relaxed) {
                    return (records, None);
                }
                if let Some(stop) = self.interrupted() {
                    return (records, Some(stop));
                }
                match self.run_one(&mut executor, iteration, seed) {
                    Ok(record) => records.push(record),
                    Err(error) => {
                        first_failure.fetch_min(iteration, Ordering::Relaxed);
                        return (records, Some(Stop::Failed { iteration, error }));
                    }
                }
            }
            (records, None)
        };

        let batches: Vec<(Vec<IterationRecord>, Option<Stop>)> = match self.config.max_parallelism
        {
            Some(threads) => match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
                Ok(pool) => pool.install(|| {
                    seeds
                        .par_chunks(MAX_BATCH_SIZE)
                        .enumerate()
                        .map(run_batch)
                        .collect()
                }),
                Err(err) => {
                    warn!(error = %err, "could not build thread pool, running sequentially");
                    return self.run_sequential(seeds);
                }
            },
            None => seeds
                .par_chunks(MAX_BATCH_SIZE)
                .enumerate()
                .map(run_batch)
                .collect(),
        };

        let mut run = Run::default();
        for ((records, stop), chunk) in batches.into_iter().zip(seeds.chunks(MAX_BATCH_SIZE)) {
            let complete = records.len() == chunk.len();
            run.records.extend(records);
            if !complete {
                run.stop = stop;
                break;
            }
        }
        run
    }

    fn run(&self, seeds: &[u64]) -> Run {
        #[cfg(feature = "parallel")]
        {
            if self.parallel_eligible(seeds.len()) {
                return self.run_parallel(seeds);
            }
        }
        self.run_sequential(seeds)
    }

    #[cfg(feature = "parallel")]
    fn parallel_eligible(&self, iterations: usize) -> bool {
        iterations > 1 && !self.plan.is_stateful() && self.config.max_parallelism != Some(1)
    }
}

/// OUTPUT node ids to record, validated against the graph
fn selected_outputs(graph: &Graph, config: &SimulationConfig) -> Result<Vec<NodeId>, ExecutionError> {
    if config.output_node_ids.is_empty() {
        return Ok(graph
            .nodes
            .iter()
            .filter(|n| matches!(n.kind, NodeKind::Output(_)))
            .map(|n| n.id.clone())
            .collect());
    }
    for id in &config.output_node_ids {
        match graph.node(id) {
            Some(node) if matches!(node.kind, NodeKind::Output(_)) => {}
            Some(_) => {
                return Err(ExecutionError::InvalidGraph(format!(
                    "node {id} is not an OUTPUT node"
                )));
            }
            None => {
                return Err(ExecutionError::InvalidGraph(format!(
                    "output node {id} not found"
                )));
            }
        }
    }
    Ok(config.output_node_ids.clone())
}

/// Run `graph` for the configured number of iterations.
///
/// Iteration `i` draws from a sub-stream seeded by the `i`th value of the
/// master seed's stream, so a fixed seed reproduces every sample exactly.
/// Timeouts and cancellation are checked between iterations and keep the
/// iterations completed so far.
pub fn run_monte_carlo_simulation(
    graph: &Graph,
    config: &SimulationConfig,
    progress: Option<&SimulationProgress>,
) -> SimulationResult {
    let start = Instant::now();
    let seed = config.seed.unwrap_or_else(entropy_seed);
    let elapsed_ms = || u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

    let compiled = ExecutionPlan::compile(graph)
        .and_then(|plan| selected_outputs(graph, config).map(|outputs| (plan, outputs)));
    let (plan, selected) = match compiled {
        Ok(compiled) => compiled,
        Err(err) => {
            warn!(graph = %graph.id, error = %err, "simulation rejected graph");
            return SimulationResult {
                success: false,
                seed,
                error: Some(err.to_string()),
                failed_node: err.node_id().cloned(),
                execution_time_ms: elapsed_ms(),
                ..SimulationResult::default()
            };
        }
    };

    let iterations = config.effective_iterations();
    if let Some(progress) = progress {
        progress.reset(iterations);
    }
    info!(graph = %graph.id, iterations, seed, "starting Monte Carlo run");

    let driver = Driver {
        plan: &plan,
        config,
        deadline: config
            .max_execution_time_ms
            .map(|ms| start + Duration::from_millis(ms)),
        progress,
    };
    let run = driver.run(&iteration_seeds(seed, iterations));

    let completed = run.records.len();
    let mut result = SimulationResult {
        success: run.stop.is_none(),
        iterations: completed,
        seed,
        convergence: run.convergence,
        ..SimulationResult::default()
    };
    match run.stop {
        None => {}
        Some(Stop::Timeout) => {
            let err = ExecutionError::Timeout { completed };
            warn!(completed, "Monte Carlo run timed out");
            result.error = Some(err.to_string());
        }
        Some(Stop::Cancelled) => {
            warn!(completed, "Monte Carlo run cancelled");
            result.error = Some(ExecutionError::Cancelled.to_string());
        }
        Some(Stop::Failed { iteration, error }) => {
            warn!(iteration, error = %error, "Monte Carlo iteration failed");
            result.error = Some(error.to_string());
            result.failed_iteration = Some(iteration);
            result.failed_node = error.node_id().cloned();
        }
    }

    let mut samples: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    let mut intermediates = config.capture_intermediates.then(Vec::new);
    for (iteration, record) in run.records.into_iter().enumerate() {
        for output in record.outputs {
            if !selected.contains(&output.node_id) {
                continue;
            }
            samples
                .entry(SimulationResult::key(&output.node_id, &output.output_key))
                .or_default()
                .push(output.value.to_number());
            result.results.push(SampleRecord {
                node_id: output.node_id,
                output_key: output.output_key,
                value: output.value,
                iteration,
            });
        }
        result.constraint_violations.extend(record.violations);
        if let (Some(all), Some(values)) = (intermediates.as_mut(), record.intermediates) {
            all.push(values);
        }
    }
    result.intermediates = intermediates;
    result.aggregated = samples
        .into_iter()
        .filter_map(|(key, xs)| {
            RiskMetrics::from_samples(&xs, config.confidence_level).map(|m| (key, m))
        })
        .collect();

    result.execution_time_ms = elapsed_ms();
    info!(
        completed,
        success = result.success,
        elapsed_ms = result.execution_time_ms,
        "Monte Carlo run finished"
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DistributionSpec, Edge, Node, NodeKind};

    fn normal_graph() -> Graph {
        let draw = Node::new("draw", NodeKind::Distribution(DistributionSpec::normal(100.0, 15.0)))
            .with_id("draw");
        let out = Node::new("out", NodeKind::output()).with_id("out");
        Graph::new("mc")
            .add_node(draw.clone())
            .unwrap()
            .add_node(out.clone())
            .unwrap()
            .add_edge(Edge::connect(&draw, "value", &out, "value").unwrap())
            .unwrap()
    }

    #[test]
    fn test_progress_callback_fires_per_percent() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let progress = SimulationProgress::new().with_callback(move |update| {
            assert!(update.progress >= 1 && update.progress <= 100);
            counter.fetch_add(1, Ordering::Relaxed);
        });
        progress.reset(200);
        for _ in 0..200 {
            progress.increment();
        }
        assert_eq!(progress.completed(), 200);
        assert_eq!(seen.load(Ordering::Relaxed), 100);
    }

    #[test]
    fn test_records_every_iteration() {
        let config = SimulationConfig::new(250).with_seed(3);
        let result = run_monte_carlo_simulation(&normal_graph(), &config, None);
        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.iterations, 250);
        assert_eq!(result.results.len(), 250);
        assert_eq!(result.seed, 3);
        let iterations: Vec<usize> = result.results.iter().map(|r| r.iteration).collect();
        assert_eq!(iterations, (0..250).collect::<Vec<_>>());
        assert_eq!(result.aggregated["out:value"].count, 250);
    }

    #[test]
    fn test_unknown_output_selection_fails() {
        let config = SimulationConfig::new(5).with_outputs(["missing"]);
        let result = run_monte_carlo_simulation(&normal_graph(), &config, None);
        assert!(!result.success);
        assert!(result.error.unwrap().contains("missing"));
    }

    #[test]
    fn test_cancel_before_start_keeps_zero_iterations() {
        let progress = SimulationProgress::new();
        progress.cancel();
        let config = SimulationConfig::new(50).with_seed(1);
        let result = run_monte_carlo_simulation(&normal_graph(), &config, Some(&progress));
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("cancelled"));
        assert_eq!(result.iterations, 0);
        assert!(result.aggregated.is_empty());
    }

    #[test]
    fn test_zero_budget_times_out() {
        let config = SimulationConfig::new(1000)
            .with_seed(1)
            .with_timeout(Duration::ZERO);
        let result = run_monte_carlo_simulation(&normal_graph(), &config, None);
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("timeout"));
        assert!(result.iterations < 1000);
        assert_eq!(result.results.len(), result.iterations);
    }
}
