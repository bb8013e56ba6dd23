use criterion::{black_box, criterion_group, criterion_main, Criterion};
use pullpush::pipeline::{suppress_unchanged_fields, BatchSizer};
use pullpush::{InMemoryDocumentStore, Pipeline, PipelineConfig, Record};
use serde_json::json;
use std::sync::Arc;

fn records(count: usize) -> Vec<Record> {
    (0..count)
        .filter_map(|i| {
            json!({"_id": format!("doc-{i:06}"), "n": i, "text": "lorem ipsum dolor sit amet"})
                .as_object()
                .cloned()
        })
        .collect()
}

fn benchmark_batch_sizing(c: &mut Criterion) {
    let sample = records(10);
    let sizer = BatchSizer::new(100.0, 2000);
    c.bench_function("batch_sizing", |b| b.iter(|| sizer.batch_size(black_box(&sample))));
}

fn benchmark_field_suppression(c: &mut Criterion) {
    let originals = records(1000);
    let output: Vec<Record> = originals
        .iter()
        .cloned()
        .map(|mut r| {
            r.insert("score".into(), json!(1.0));
            r
        })
        .collect();
    c.bench_function("field_suppression_1000", |b| {
        b.iter(|| suppress_unchanged_fields(black_box(output.clone()), &originals, "_id"))
    });
}

fn benchmark_pipeline_run(c: &mut Criterion) {
    let config = PipelineConfig {
        show_progress: false,
        push_item_timeout_ms: 5,
        poll_interval_ms: 1,
        update_workers: 2,
        push_workers: 2,
        ..PipelineConfig::default()
    };
    let transform = |batch: Vec<Record>| -> anyhow::Result<Vec<Record>> { Ok(batch) };

    c.bench_function("pipeline_run_2000", |b| {
        b.iter(|| {
            let store = Arc::new(InMemoryDocumentStore::with_records("_id", records(2000)));
            Pipeline::new(store, Arc::new(transform), config.clone())
                .and_then(|p| p.run())
                .and_then(|outcome| outcome.wait())
        })
    });
}

criterion_group!(
    benches,
    benchmark_batch_sizing,
    benchmark_field_suppression,
    benchmark_pipeline_run
);
criterion_main!(benches);
