use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::Result;
use riskgraph::commands::{self, Outcome};
use riskgraph::io::{read_graph, read_json_arg, write_json, write_text};
use riskgraph::{LimitOverrides, Limits, init_logging};
use riskgraph_core::model::Value;
use riskgraph_core::{SensitivityConfig, SimulationConfig, SimulationProgress};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(name = "riskgraph")]
#[command(about = "Execute and simulate scenario graphs")]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// YAML file with resource limits
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check references, cycles and expressions
    Validate {
        graph: PathBuf,
    },
    /// Print nodes in execution order
    Sort {
        graph: PathBuf,
    },
    /// Execute the graph once
    Run {
        graph: PathBuf,
        /// Parameter overrides as JSON or @file
        #[arg(short, long)]
        params: Option<String>,
        #[arg(short, long)]
        seed: Option<u64>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Run a Monte Carlo simulation
    Simulate(SimulateArgs),
    /// Sweep one parameter and record an output
    Sensitivity(SensitivityArgs),
    /// Wrap a graph in the versioned export envelope
    Export {
        graph: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Read an export and give it fresh ids
    Import {
        file: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct SimulateArgs {
    graph: PathBuf,
    #[arg(short = 'n', long, default_value_t = 1000)]
    iterations: usize,
    #[arg(short, long)]
    seed: Option<u64>,
    /// Single pass instead of repeated sampling
    #[arg(long)]
    deterministic: bool,
    /// OUTPUT node ids to record (default: all)
    #[arg(long, value_delimiter = ',')]
    outputs: Vec<String>,
    #[arg(long, default_value_t = 0.95)]
    confidence: f64,
    #[arg(long, default_value_t = 1.0)]
    time_step: f64,
    /// Worker threads; 1 runs sequentially
    #[arg(short, long)]
    threads: Option<usize>,
    #[arg(long)]
    timeout_ms: Option<u64>,
    /// Keep every node's value for every iteration
    #[arg(long)]
    intermediates: bool,
    /// Parameter overrides as JSON or @file
    #[arg(short, long)]
    params: Option<String>,
    /// Report progress on stderr
    #[arg(long)]
    progress: bool,
    #[command(flatten)]
    limits: LimitArgs,
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct SensitivityArgs {
    graph: PathBuf,
    /// Node whose field is swept
    #[arg(long)]
    node: String,
    #[arg(long, default_value = "value")]
    field: String,
    /// Node whose value is recorded
    #[arg(long = "output-node")]
    output_node: String,
    #[arg(long, default_value = "value")]
    output_field: String,
    #[arg(long, allow_hyphen_values = true)]
    min: f64,
    #[arg(long, allow_hyphen_values = true)]
    max: f64,
    #[arg(long, default_value_t = 10)]
    steps: usize,
    /// Iterations averaged at each step
    #[arg(short = 'n', long, default_value_t = 1)]
    iterations: usize,
    #[arg(short, long)]
    seed: Option<u64>,
    #[arg(short, long)]
    params: Option<String>,
    #[arg(long)]
    progress: bool,
    #[command(flatten)]
    limits: LimitArgs,
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct LimitArgs {
    /// Ceiling on iterations (env MAX_SIMULATION_ITERATIONS)
    #[arg(long)]
    max_iterations: Option<usize>,
    /// Ceiling on run time in ms (env MAX_SIMULATION_TIME)
    #[arg(long)]
    max_time_ms: Option<u64>,
    /// Ceiling on stored samples (env MAX_STORED_RESULTS)
    #[arg(long)]
    max_stored: Option<usize>,
}

impl LimitArgs {
    fn resolve(&self, config: Option<&Path>) -> Result<Limits> {
        Ok(Limits::load(config)?.with_env()?.with_overrides(LimitOverrides {
            max_simulation_iterations: self.max_iterations,
            max_simulation_time_ms: self.max_time_ms,
            max_stored_results: self.max_stored,
        }))
    }
}

fn parameters(arg: Option<&str>) -> Result<Value> {
    arg.map_or(Ok(Value::Undefined), read_json_arg)
}

fn progress_reporter(enabled: bool) -> Option<SimulationProgress> {
    enabled.then(|| {
        SimulationProgress::new().with_callback(|update| {
            eprint!("\r{:>3}% ({}/{})", update.progress, update.completed, update.total);
            if update.completed >= update.total {
                eprintln!();
            }
        })
    })
}

fn emit<T: Serialize + Outcome>(path: Option<&Path>, report: &T) -> Result<ExitCode> {
    write_json(path, report)?;
    Ok(if report.succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn main() -> Result<ExitCode> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_logging(cli.log_file.as_deref(), &cli.log_level)?;
    let config = cli.config.as_deref();

    let code = match cli.command {
        Command::Validate { graph } => emit(None, &commands::validate(&read_graph(&graph)?))?,
        Command::Sort { graph } => emit(None, &commands::sort(&read_graph(&graph)?))?,
        Command::Run {
            graph,
            params,
            seed,
            output,
        } => {
            let graph = read_graph(&graph)?;
            let params = parameters(params.as_deref())?;
            emit(output.as_deref(), &commands::run(&graph, &params, seed))?
        }
        Command::Simulate(args) => {
            let limits = args.limits.resolve(config)?;
            let graph = read_graph(&args.graph)?;
            let mut sim = if args.deterministic {
                SimulationConfig::deterministic()
            } else {
                SimulationConfig::new(args.iterations)
            }
            .with_outputs(args.outputs)
            .with_confidence_level(args.confidence)
            .with_time_step(args.time_step)
            .with_parameters(parameters(args.params.as_deref())?);
            sim.graph_id = Some(graph.id.clone());
            sim.seed = args.seed;
            sim.max_parallelism = args.threads;
            sim.max_execution_time_ms = args.timeout_ms;
            sim.capture_intermediates = args.intermediates;

            let progress = progress_reporter(args.progress);
            let report = commands::simulate(&graph, sim, &limits, progress.as_ref());
            emit(args.output.as_deref(), &report)?
        }
        Command::Sensitivity(args) => {
            let limits = args.limits.resolve(config)?;
            let graph = read_graph(&args.graph)?;
            let mut sens = SensitivityConfig::new(
                args.node,
                args.field,
                args.output_node,
                args.output_field,
                (args.min, args.max),
                args.steps,
            )
            .with_iterations(args.iterations)
            .with_parameters(parameters(args.params.as_deref())?);
            if let Some(seed) = args.seed {
                sens = sens.with_seed(seed);
            }
            let progress = progress_reporter(args.progress);
            let report = commands::sensitivity(&graph, sens, &limits, progress.as_ref());
            emit(args.output.as_deref(), &report)?
        }
        Command::Export { graph, output } => {
            write_text(output.as_deref(), &commands::export(&read_graph(&graph)?)?)?;
            ExitCode::SUCCESS
        }
        Command::Import { file, output } => {
            let json = std::fs::read_to_string(&file)?;
            write_json(output.as_deref(), &commands::import(&json)?)?;
            ExitCode::SUCCESS
        }
    };

    tracing::debug!("riskgraph finished");
    Ok(code)
}
