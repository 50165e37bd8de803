use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use trellis_bench::util::{GraphShape, generate_nested_graph};
use trellis_core::EntityId;

fn bench_collapse_expand_root(c: &mut Criterion) {
    let model = generate_nested_graph(GraphShape::default()).unwrap();
    let root = EntityId::from("root_0");

    c.bench_function("collapse_expand_root", |b| {
        b.iter_batched(
            || model.clone(),
            |mut model| {
                model.collapse_container(&root);
                model.expand_container(&root);
                black_box(model.aggregated_edges().len());
            },
            BatchSize::LargeInput,
        )
    });
}

fn bench_collapse_all(c: &mut Criterion) {
    let model = generate_nested_graph(GraphShape::default()).unwrap();

    c.bench_function("collapse_all_aggregates", |b| {
        b.iter_batched(
            || model.clone(),
            |mut model| {
                model.collapse_all();
                black_box(model.aggregated_edges().len());
            },
            BatchSize::LargeInput,
        )
    });
}

fn bench_snapshot(c: &mut Criterion) {
    let mut model = generate_nested_graph(GraphShape::default()).unwrap();
    model.collapse_container(&EntityId::from("root_1"));

    c.bench_function("visible_snapshot", |b| {
        b.iter(|| black_box(model.snapshot()))
    });
}

criterion_group!(
    benches,
    bench_collapse_expand_root,
    bench_collapse_all,
    bench_snapshot
);
criterion_main!(benches);
