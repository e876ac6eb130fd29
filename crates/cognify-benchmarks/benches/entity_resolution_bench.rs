//! Benchmarks the Entity Resolver (§4.4) over batches of increasing size,
//! the O(N^2/T) per-type pairwise comparison hot path §5's worker-pool
//! sizing is tuned against.

use cognify_benchmarks::synthetic_entity_batch;
use cognify_core::TenantId;
use cognify_resolution::{EntityResolver, ResolverConfig};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn bench_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("entity_resolver_resolve");
    let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");
    let tenant = TenantId::new();

    for count in [20usize, 100, 300] {
        let entities = synthetic_entity_batch(tenant, "Acme Corp", count);

        group.bench_with_input(BenchmarkId::from_parameter(count), &entities, |b, entities| {
            b.iter(|| {
                let resolver = EntityResolver::new(ResolverConfig::default(), None);
                runtime.block_on(resolver.resolve(black_box(entities.clone()))).expect("resolution should not fail on synthetic input")
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_resolution);
criterion_main!(benches);
