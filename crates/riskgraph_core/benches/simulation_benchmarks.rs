//! Criterion benchmarks for riskgraph_core
//!
//! Run with: cargo bench -p riskgraph_core

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use riskgraph_core::config::SimulationConfig;
use riskgraph_core::engine::{ExecutionPlan, Executor, execute_graph};
use riskgraph_core::expr::{self, ExpressionCache, ExpressionContext};
use riskgraph_core::model::{
    AggregationMethod, DistributionSpec, Edge, Graph, Node, NodeKind, Port, Value,
};
use riskgraph_core::rng::set_seed;
use riskgraph_core::simulation::run_monte_carlo_simulation;

/// Project cash flow model: revenue and cost drivers summed over `years` periods
fn create_cash_flow_graph(years: usize) -> Graph {
    let demand = Node::new(
        "Demand",
        NodeKind::Distribution(DistributionSpec::normal(10_000.0, 1_500.0)),
    );
    let price = Node::new("Price", NodeKind::parameter(25.0));
    let cost = Node::new(
        "Unit cost",
        NodeKind::Distribution(DistributionSpec::Triangular {
            min: 12.0,
            mode: 15.0,
            max: 21.0,
        }),
    );
    let total = Node::new("NPV", NodeKind::aggregator(AggregationMethod::Sum));
    let out = Node::new("Result", NodeKind::output());

    let mut graph = Graph::new("cash flow")
        .add_node(demand.clone())
        .and_then(|g| g.add_node(price.clone()))
        .and_then(|g| g.add_node(cost.clone()))
        .and_then(|g| g.add_node(total.clone()))
        .and_then(|g| g.add_node(out.clone()))
        .expect("unique nodes");

    for year in 0..years {
        let flow = Node::new(
            format!("Year {year}"),
            NodeKind::transformer(format!(
                "demand * (price - cost) / pow(1.08, {year})"
            )),
        )
        .with_inputs(vec![
            Port::number("demand"),
            Port::number("price"),
            Port::number("cost"),
        ]);
        graph = graph
            .add_node(flow.clone())
            .and_then(|g| g.add_edge(Edge::connect(&demand, "value", &flow, "demand")?))
            .and_then(|g| g.add_edge(Edge::connect(&price, "value", &flow, "price")?))
            .and_then(|g| g.add_edge(Edge::connect(&cost, "value", &flow, "cost")?))
            .and_then(|g| g.add_edge(Edge::connect(&flow, "value", &total, "values")?))
            .expect("valid wiring");
    }
    graph
        .add_edge(Edge::connect(&total, "value", &out, "value").expect("ports"))
        .expect("valid wiring")
}

fn bench_single_pass(c: &mut Criterion) {
    let graph = create_cash_flow_graph(10);

    c.bench_function("execute_graph_10yr", |b| {
        b.iter(|| {
            execute_graph(
                black_box(&graph),
                black_box(&Value::Undefined),
                &mut set_seed(42),
            )
        })
    });

    let plan = ExecutionPlan::compile(&graph).expect("acyclic");
    let mut executor = Executor::new(&plan);
    let mut rng = set_seed(42);
    c.bench_function("executor_step_10yr", |b| {
        b.iter(|| executor.step(black_box(0), &mut rng))
    });
}

fn bench_expressions(c: &mut Criterion) {
    let source = "max(0, min(100, a * 1.5 + sqrt(abs(b)) - c / 2))";
    let inputs: Value =
        serde_json::from_str(r#"{"a": 12.5, "b": -49, "c": 3}"#).expect("valid json");
    let ctx = ExpressionContext::default().with_inputs(&inputs);
    let mut rng = set_seed(1);

    c.bench_function("expression_parse_and_eval", |b| {
        b.iter(|| expr::evaluate_str(black_box(source), &ctx, &mut rng))
    });

    let mut cache = ExpressionCache::new();
    c.bench_function("expression_cached_eval", |b| {
        b.iter(|| {
            let parsed = cache.get_or_parse(black_box(source)).expect("parses");
            expr::evaluate(&parsed, &ctx, &mut rng)
        })
    });
}

fn bench_monte_carlo(c: &mut Criterion) {
    let mut group = c.benchmark_group("monte_carlo");
    let graph = create_cash_flow_graph(10);

    for iterations in [100, 1000, 10_000].iter() {
        let config = SimulationConfig::new(*iterations).with_seed(42);

        group.bench_with_input(
            BenchmarkId::new("iterations", iterations),
            iterations,
            |b, _| b.iter(|| run_monte_carlo_simulation(black_box(&graph), black_box(&config), None)),
        );
    }

    let sequential = SimulationConfig::new(10_000)
        .with_seed(42)
        .with_max_parallelism(1);
    group.bench_function("sequential_10000", |b| {
        b.iter(|| run_monte_carlo_simulation(black_box(&graph), black_box(&sequential), None))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_single_pass,
    bench_expressions,
    bench_monte_carlo,
);
criterion_main!(benches);
