//! Benchmarks the Chunker (§4.1) over documents of increasing size, the
//! per-chunk-boundary-decision hot path §5's worker-pool sizing is tuned
//! against.

use cognify_benchmarks::synthetic_document_text;
use cognify_chunking::{Chunker, ChunkerConfig, Document};
use cognify_core::DataId;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn bench_chunking(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunker_split");
    let config = ChunkerConfig::new(512, 50).expect("valid chunker config");
    let chunker = Chunker::new(config);

    for paragraphs in [10usize, 100, 500] {
        let text = synthetic_document_text(paragraphs);
        let document = Document::new(DataId::new(), text);

        group.bench_with_input(BenchmarkId::from_parameter(paragraphs), &document, |b, document| {
            b.iter(|| chunker.split(black_box(document), 0).expect("chunking should not fail on synthetic input"));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_chunking);
criterion_main!(benches);
