use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use flow_context_store::{ContextStore, StoreConfig};
use serde_json::json;
use std::hint::black_box;
use tokio::runtime::Runtime;

async fn open_store() -> ContextStore {
    let store = ContextStore::in_memory(StoreConfig::default());
    store.open().await.unwrap();
    store
}

fn store_benchmarks(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    // Benchmark: Set single key
    c.bench_function("set_single_key", |b| {
        b.to_async(&rt).iter(|| async {
            let store = open_store().await;
            store
                .set("f1", "counter", black_box(json!(1)))
                .await
                .unwrap();
        });
    });

    // Benchmark: Set and get per partition
    let mut group = c.benchmark_group("set_and_get");
    for scope in ["global", "f1", "n1:f1"] {
        group.bench_with_input(BenchmarkId::from_parameter(scope), scope, |b, scope| {
            b.to_async(&rt).iter(|| async move {
                let store = open_store().await;
                store.set(scope, "k", json!({"v": 1})).await.unwrap();
                let _value = store.get(black_box(scope), "k").await.unwrap();
            });
        });
    }
    group.finish();

    // Benchmark: Keys listing with different scope sizes
    let mut group = c.benchmark_group("keys_listing");
    for size in [10, 100, 1000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.to_async(&rt).iter(|| async move {
                let store = open_store().await;
                for i in 0..size {
                    store.set("f1", format!("key-{}", i), json!(i)).await.unwrap();
                }
                let _keys = store.keys(black_box("f1")).await.unwrap();
            });
        });
    }
    group.finish();

    // Benchmark: Clean over many node scopes
    c.bench_function("clean_100_nodes", |b| {
        b.to_async(&rt).iter(|| async {
            let store = open_store().await;
            for i in 0..100 {
                store
                    .set(&format!("n{}:f1", i), "state", json!(i))
                    .await
                    .unwrap();
            }
            let active: Vec<String> = (0..50).map(|i| format!("n{}", i)).collect();
            store.clean(black_box(active.as_slice())).await.unwrap();
        });
    });
}

criterion_group!(benches, store_benchmarks);
criterion_main!(benches);
