//! Run the same simulation on one worker and on every core, then print timings and speedup.
//!
//! Usage: cargo run --release --bin benchmark_parallel_speedup -- [RUNS]
//!
//! Run from the project root so data/sample is available.

use std::env;
use std::path::PathBuf;
use std::time::Instant;

use coursecast::config::Settings;
use coursecast::data::registry::DataRegistry;
use coursecast::optimizer::{
    CourseUtility, MonteCarloAggregator, ScheduleOptimizer, SimulationRequest,
};
use coursecast::parallel::WorkerPool;

fn main() {
    let runs: usize = env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(500);

    let settings = Settings {
        courses_path: PathBuf::from("data/sample/courses.csv"),
        z_table_path: PathBuf::from("data/sample/z_table.csv"),
        max_runs: runs.max(1),
        ..Settings::default()
    };
    let registry = match DataRegistry::load(&settings) {
        Ok(registry) => registry,
        Err(err) => {
            eprintln!("failed to load sample data: {err}");
            std::process::exit(1);
        }
    };
    let table_seeds = registry.price_model().table().seeds().len();
    let request = SimulationRequest {
        budget: 6000.0,
        max_credit_weight: 4.0,
        items: registry
            .catalog()
            .courses()
            .iter()
            .enumerate()
            .map(|(i, course)| CourseUtility {
                id: course.id,
                utility: 40.0 + (i * 7 % 60) as f64,
            })
            .collect(),
        fixed_items: Vec::new(),
        num_runs: runs.min(table_seeds.max(1)),
        base_seed: None,
        include_runs: false,
    };

    println!(
        "Monte Carlo: {} courses x {} runs",
        request.items.len(),
        request.num_runs
    );
    println!();

    let limits = coursecast::optimizer::RequestLimits {
        max_runs: settings.max_runs,
    };
    let sequential = MonteCarloAggregator::new(ScheduleOptimizer::new(&registry))
        .with_pool(WorkerPool::with_workers(1))
        .with_limits(limits);
    let parallel = MonteCarloAggregator::new(ScheduleOptimizer::new(&registry)).with_limits(limits);

    let t0 = Instant::now();
    let seq = sequential.simulate(&request);
    let seq_elapsed = t0.elapsed();
    let t0 = Instant::now();
    let par = parallel.simulate(&request);
    let par_elapsed = t0.elapsed();

    let (seq, par) = match (seq, par) {
        (Ok(seq), Ok(par)) => (seq, par),
        (Err(err), _) | (_, Err(err)) => {
            eprintln!("simulation failed: {err}");
            std::process::exit(1);
        }
    };

    let solves = request.num_runs as f64;
    let seq_ms = seq_elapsed.as_secs_f64() * 1000.0;
    let par_ms = par_elapsed.as_secs_f64() * 1000.0;
    println!("Sequential:  {seq_ms:.2} ms  ({:.1} solves/s)", solves / seq_elapsed.as_secs_f64());
    println!("Parallel:    {par_ms:.2} ms  ({:.1} solves/s)", solves / par_elapsed.as_secs_f64());
    println!();
    println!("Speedup:     {:.2}x", seq_ms / par_ms);

    assert_eq!(seq.per_item, par.per_item, "per-item probabilities differ");
    assert_eq!(seq.per_schedule, par.per_schedule, "per-schedule probabilities differ");
    println!("(Results match sequential vs parallel)");
}
