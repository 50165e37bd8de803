use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use trellis_bench::util::{GraphShape, generate_nested_graph};
use trellis_core::EntityId;
use trellis_graph::{LayeredLayoutEngine, LayoutBridge};

fn bench_layered_layout(c: &mut Criterion) {
    let mut model = generate_nested_graph(GraphShape::default()).unwrap();
    model.collapse_container(&EntityId::from("root_2"));
    model.collapse_container(&EntityId::from("root_3"));
    let request = LayoutBridge::default().build_request(&model);
    let engine = LayeredLayoutEngine::default();

    c.bench_function("layered_layout", |b| {
        b.iter(|| black_box(engine.layout(black_box(&request))))
    });
}

criterion_group!(benches, bench_layered_layout);
criterion_main!(benches);
