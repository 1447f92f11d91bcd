//! Performance benchmarks for tree expansion
//!
//! Measures, on wide and deep trees:
//! - Initial scan of the flat rows
//! - Expanding and collapsing a large materialized branch
//! - Fetch-and-merge of a placeholder branch
//!
//! Run with: cargo bench

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use lazytree::{
    config::{BranchMode, TreeConfig},
    lazytree::LazyTree,
    properties::NodeDescriptor,
    source::StaticSource,
    tree::TreeEngine,
};

/// A root with `width` children, each with `width` grandchildren.
fn wide_rows(width: usize) -> Vec<NodeDescriptor> {
    let mut rows = vec![NodeDescriptor::new("R")];
    for i in 0..width {
        let child = format!("C{i}");
        rows.push(NodeDescriptor::new(child.clone()).with_parent("R"));
        for j in 0..width {
            rows.push(NodeDescriptor::new(format!("C{i}.{j}")).with_parent(child.clone()));
        }
    }
    rows
}

/// A single chain `depth` rows deep.
fn deep_rows(depth: usize) -> Vec<NodeDescriptor> {
    let mut rows = vec![NodeDescriptor::new("N0")];
    for i in 1..depth {
        rows.push(NodeDescriptor::new(format!("N{i}")).with_parent(format!("N{}", i - 1)));
    }
    rows
}

fn bench_initialize(c: &mut Criterion) {
    let mut group = c.benchmark_group("initialize");
    for width in [10, 30, 60] {
        let rows = wide_rows(width);
        group.bench_with_input(BenchmarkId::from_parameter(width), &rows, |b, rows| {
            b.iter(|| TreeEngine::new(TreeConfig::default(), rows.clone(), None))
        });
    }
    group.finish();
}

fn bench_expand_collapse(c: &mut Criterion) {
    let mut engine = TreeEngine::new(TreeConfig::default(), wide_rows(60), None);
    c.bench_function("expand_collapse_wide", |b| {
        b.iter(|| {
            engine.request_expand("R", None).unwrap();
            engine.collapse("R", None).unwrap();
        })
    });

    let depth = 2_000;
    let mut engine = TreeEngine::new(TreeConfig::default(), deep_rows(depth), None);
    for i in 0..depth - 1 {
        engine.request_expand(&format!("N{i}"), None).unwrap();
    }
    c.bench_function("collapse_deep_chain", |b| {
        b.iter(|| {
            engine.collapse("N0", None).unwrap();
            engine.request_expand("N0", None).unwrap();
        })
    });
}

fn bench_fetch_and_merge(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let comments: Vec<NodeDescriptor> = (0..500)
        .map(|i| NodeDescriptor::new(format!("C{i}")).with_child_type("comments"))
        .collect();

    c.bench_function("fetch_merge_evict_500", |b| {
        let tree = LazyTree::simple(
            TreeConfig::default().with_branch_mode(BranchMode::Multiple),
            vec![
                NodeDescriptor::new("R"),
                NodeDescriptor::placeholder_for("R", Some("comments".to_string())),
            ],
            StaticSource::new().with_fragment("R", Some("comments"), comments.clone()),
        );
        let tree = &tree;
        b.to_async(&rt).iter(move || async move {
            tree.expand("R", Some("comments".to_string())).await.unwrap();
            tree.evict("R", Some("comments".to_string())).unwrap();
        })
    });
}

criterion_group!(
    benches,
    bench_initialize,
    bench_expand_collapse,
    bench_fetch_and_merge
);
criterion_main!(benches);
