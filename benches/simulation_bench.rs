//! Single-shot solve latency and sequential vs parallel simulation over the sample data.
//!
//! Run with: `cargo bench --bench simulation`

use std::path::PathBuf;

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use coursecast::config::Settings;
use coursecast::data::registry::DataRegistry;
use coursecast::optimizer::{
    CourseUtility, MonteCarloAggregator, OptimizationRequest, ScheduleOptimizer, SimulationRequest,
};
use coursecast::parallel::WorkerPool;

fn sample_registry() -> std::sync::Arc<DataRegistry> {
    let root = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("data/sample");
    let settings = Settings {
        courses_path: root.join("courses.csv"),
        z_table_path: root.join("z_table.csv"),
        ..Settings::default()
    };
    DataRegistry::load(&settings).expect("sample data")
}

fn items(registry: &DataRegistry) -> Vec<CourseUtility> {
    registry
        .catalog()
        .courses()
        .iter()
        .enumerate()
        .map(|(i, course)| CourseUtility {
            id: course.id,
            utility: 40.0 + (i * 7 % 60) as f64,
        })
        .collect()
}

fn bench_optimize(c: &mut Criterion) {
    let registry = sample_registry();
    let optimizer = ScheduleOptimizer::new(&registry);
    let request = OptimizationRequest {
        budget: 6000.0,
        max_credit_weight: 4.0,
        seed: 1,
        items: items(&registry),
        fixed_items: Vec::new(),
    };

    c.bench_function("optimize_sample_catalog", |b| {
        b.iter(|| black_box(optimizer.optimize(black_box(&request))))
    });
}

fn bench_simulate(c: &mut Criterion) {
    let registry = sample_registry();
    let request = SimulationRequest {
        budget: 6000.0,
        max_credit_weight: 4.0,
        items: items(&registry),
        fixed_items: Vec::new(),
        num_runs: registry.price_model().table().seeds().len(),
        base_seed: None,
        include_runs: false,
    };
    let sequential = MonteCarloAggregator::new(ScheduleOptimizer::new(&registry))
        .with_pool(WorkerPool::with_workers(1));
    let parallel = MonteCarloAggregator::new(ScheduleOptimizer::new(&registry));

    let mut group = c.benchmark_group("simulate");
    group.sample_size(20);
    group.throughput(Throughput::Elements(request.num_runs as u64));
    group.bench_function("sequential", |b| {
        b.iter(|| black_box(sequential.simulate(&request)))
    });
    group.bench_function("parallel", |b| {
        b.iter(|| black_box(parallel.simulate(&request)))
    });
    group.finish();
}

criterion_group!(benches, bench_optimize, bench_simulate);
criterion_main!(benches);
