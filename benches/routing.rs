//! Benchmark for claim-to-group routing
//!
//! Fan-out of one claim against a namespace full of groups, both as the pure
//! snapshot match and through the store-backed router.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use replication_group_operator::reconcile::{route_claim, Router};
use replication_group_operator::selector::Selector;
use replication_group_operator::store::fixtures::{claim, group};
use replication_group_operator::store::MemoryStore;
use replication_group_operator::ReplicationGroup;
use std::collections::BTreeMap;
use std::sync::Arc;

fn groups(count: usize) -> Vec<ReplicationGroup> {
    (0..count)
        .map(|i| {
            let app = format!("app-{}", i % 50);
            group("bench", &format!("g-{:04}", i), &[("app", app.as_str())])
        })
        .collect()
}

fn bench_route_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("routing");
    let target = claim("bench", "c1", &[("app", "app-7"), ("tier", "data")]);

    for count in [10usize, 100, 1000] {
        let snapshot = groups(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("route_claim", count), &snapshot, |b, s| {
            b.iter(|| route_claim(black_box(s), black_box(&target)));
        });
    }

    group.finish();
}

fn bench_router(c: &mut Criterion) {
    let mut group = c.benchmark_group("routing");
    group.throughput(Throughput::Elements(1000));

    let store = Arc::new(MemoryStore::new());
    for g in groups(1000) {
        store.insert_group(g);
    }
    let router = Router::new(store);
    let target = claim("bench", "c1", &[("app", "app-7")]);
    let rt = tokio::runtime::Runtime::new().unwrap();

    group.bench_function("router_1000_groups", |b| {
        b.iter(|| rt.block_on(router.route(black_box(&target))));
    });

    group.finish();
}

fn bench_selector(c: &mut Criterion) {
    let mut group = c.benchmark_group("selector");
    group.throughput(Throughput::Elements(1));

    let expr = "app in (db,cache),tier!=frontend,!deprecated,env";
    let labels: BTreeMap<String, String> = [("app", "db"), ("tier", "data"), ("env", "prod")]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let selector = Selector::parse(expr).unwrap();

    group.bench_function("parse", |b| {
        b.iter(|| Selector::parse(black_box(expr)));
    });
    group.bench_function("matches", |b| {
        b.iter(|| selector.matches(black_box(&labels)));
    });

    group.finish();
}

criterion_group!(benches, bench_route_snapshot, bench_router, bench_selector);
criterion_main!(benches);
