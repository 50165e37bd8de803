use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use trellis_bench::util::{GraphShape, generate_nested_graph};

fn bench_search(c: &mut Criterion) {
    let mut model = generate_nested_graph(GraphShape {
        depth: 4,
        ..GraphShape::default()
    })
    .unwrap();

    c.bench_function("search_substring", |b| {
        b.iter(|| {
            model.search(black_box("render"));
            black_box(model.search_results().len());
        })
    });
    c.bench_function("search_fuzzy", |b| {
        b.iter(|| {
            model.search(black_box("schdlr"));
            black_box(model.search_results().len());
        })
    });
}

criterion_group!(benches, bench_search);
criterion_main!(benches);
