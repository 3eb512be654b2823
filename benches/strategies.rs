use std::hint::black_box;

use contention::backend::{DistributedMapStore, RelationalRowStore, StorageBackend};
use contention::config::HarnessConfig;
use contention::harness::Harness;
use contention::strategy::StrategyKind;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

const NUM_WORKERS: usize = 8;
const ITERATIONS_PER_WORKER: u64 = 10_000;

fn config() -> HarnessConfig {
    HarnessConfig::default()
        .with_workers(NUM_WORKERS)
        .with_iterations(ITERATIONS_PER_WORKER)
}

fn bench_backend(c: &mut Criterion, group_name: &str, backend: impl Fn() -> Box<dyn StorageBackend>) {
    let mut group = c.benchmark_group(group_name);
    group.sample_size(10);

    let sample = backend();
    for kind in StrategyKind::supported_by(&*sample) {
        group.bench_function(
            BenchmarkId::new(
                kind.name(),
                format!("{}workers x {}iter", NUM_WORKERS, ITERATIONS_PER_WORKER),
            ),
            |b| {
                let mut harness = Harness::new(backend(), config());
                b.iter(|| {
                    let report = harness.run(kind).unwrap();
                    black_box(report.final_value())
                })
            },
        );
    }

    group.finish();
}

fn bench_relational(c: &mut Criterion) {
    bench_backend(c, "relational_row", || {
        Box::new(RelationalRowStore::new("user_counter", 1))
    });
}

fn bench_map(c: &mut Criterion) {
    bench_backend(c, "distributed_map", || {
        Box::new(DistributedMapStore::new("counters", "key"))
    });
}

criterion_group!(benches, bench_relational, bench_map);
criterion_main!(benches);
