//! # Object Store Benchmarks
//!
//! Control-plane cost per request, independent of payload size, and the
//! data-plane copy cost that does scale with it.
//!
//! ## Usage
//!
//! ```bash
//! cargo bench --package os-tests --bench store_benchmarks
//! cargo bench --package os-tests --bench store_benchmarks -- control/direct
//! ```
//!
//! | Group | Path measured |
//! |-------|---------------|
//! | `control/direct` | create, commit, request, release, delete on `ObjectStore` |
//! | `control/server` | the same cycle through the server task |
//! | `objects` | put/get of named objects, pool reuse on replacement |
//! | `queues` | push, pop, free_handle |
//! | `client` | full client put/get including the region copy |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use os_01_block_registry::{BlockStoreApi, PoolConfig};
use os_02_object_directory::ObjectStoreApi;
use os_tests::fixtures::{memory_client, memory_store_with, spawn_memory_server};
use shared_types::{ClientId, ControlRequest, ControlResponse, RequestEnvelope, ResponseEnvelope};
use std::time::Duration;
use store_runtime::ControlChannel;
use tokio::runtime::Runtime;

const SIZES: [usize; 4] = [64, 4 << 10, 256 << 10, 4 << 20];

fn bench_config() -> PoolConfig {
    PoolConfig {
        min_class_size: 64,
        max_block_size: 8 << 20,
        max_pool_bytes: Some(256 << 20),
    }
}

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("benchmark runtime")
}

// =============================================================================
// CONTROL PLANE
// =============================================================================

fn bench_direct_lifecycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("control/direct");

    for size in SIZES {
        let mut store = memory_store_with(bench_config());
        let owner = ClientId::new();

        group.bench_with_input(BenchmarkId::new("block_cycle", size), &size, |b, &size| {
            b.iter(|| {
                let handle = store.create_block(size, owner).unwrap();
                store.commit(handle.block_ref(), owner).unwrap();
                let read = store.request_data(handle.block_id, None).unwrap();
                store.release(read.block_ref()).unwrap();
                store.delete(handle.block_id, false).unwrap();
                black_box(handle.generation)
            })
        });
    }

    group.finish();
}

fn bench_server_lifecycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("control/server");
    let rt = runtime();

    for size in SIZES {
        let (server, _task, _regions) = rt.block_on(async { spawn_memory_server(bench_config()) });
        let owner = ClientId::new();

        group.bench_with_input(BenchmarkId::new("block_cycle", size), &size, |b, &size| {
            b.iter(|| {
                rt.block_on(async {
                    let handle = match server
                        .call(request(owner, ControlRequest::CreateBlock { size }))
                        .await
                    {
                        Ok(ResponseEnvelope {
                            result: Ok(ControlResponse::Handle(handle)),
                            ..
                        }) => handle,
                        other => panic!("unexpected reply: {:?}", other),
                    };
                    let block = handle.block_ref();
                    for req in [
                        ControlRequest::Commit { block },
                        ControlRequest::Delete {
                            block_id: handle.block_id,
                            force: false,
                        },
                    ] {
                        let reply = server.call(request(owner, req)).await.unwrap();
                        black_box(reply.result.unwrap());
                    }
                })
            })
        });

        rt.block_on(server.shutdown()).unwrap();
    }

    group.finish();
}

fn request(owner: ClientId, request: ControlRequest) -> RequestEnvelope {
    RequestEnvelope::new(owner, request)
}

// =============================================================================
// OBJECTS AND QUEUES
// =============================================================================

fn bench_object_replacement(c: &mut Criterion) {
    let mut group = c.benchmark_group("objects");
    let mut store = memory_store_with(bench_config());
    let owner = ClientId::new();

    // Replacement keeps superseded heads alive; remove periodically so the
    // pool is exercised instead of the budget.
    group.bench_function("put_get_remove", |b| {
        b.iter(|| {
            for _ in 0..4 {
                let block = store.create_block(1024, owner).unwrap();
                store.put("bench", block.block_ref(), owner).unwrap();
            }
            let read = store.get("bench").unwrap();
            store.release(read.block_ref()).unwrap();
            store.remove_object("bench", false).unwrap();
        })
    });

    group.finish();
}

fn bench_queue_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("queues");
    group.measurement_time(Duration::from_secs(5));

    for depth in [1usize, 64, 1024] {
        let mut store = memory_store_with(bench_config());
        let owner = ClientId::new();

        group.throughput(Throughput::Elements(depth as u64));
        group.bench_with_input(BenchmarkId::new("push_pop_free", depth), &depth, |b, &depth| {
            b.iter(|| {
                for _ in 0..depth {
                    let block = store.create_block(256, owner).unwrap();
                    store.push_to_object("q", block.block_ref(), owner).unwrap();
                }
                for _ in 0..depth {
                    let (_, handle) = store.pop_from_object("q").unwrap();
                    store.free_handle("q", handle.block_ref()).unwrap();
                }
            })
        });
    }

    group.finish();
}

// =============================================================================
// CLIENT
// =============================================================================

fn bench_client_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("client");
    let rt = runtime();

    for size in SIZES {
        let (server, _task, regions) = rt.block_on(async { spawn_memory_server(bench_config()) });
        let client = memory_client(&server, &regions);
        let data = vec![0xA5u8; size];

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("put_get", size), &data, |b, data| {
            b.iter(|| {
                rt.block_on(async {
                    client.put("bench", data).await.unwrap();
                    let bytes = client.get("bench").await.unwrap();
                    client.remove_object("bench", false).await.unwrap();
                    black_box(bytes.len())
                })
            })
        });

        rt.block_on(server.shutdown()).unwrap();
    }

    group.finish();
}

criterion_group!(
    name = store_benches;
    config = Criterion::default()
        .sample_size(50)
        .measurement_time(Duration::from_secs(5));
    targets =
        bench_direct_lifecycle,
        bench_server_lifecycle,
        bench_object_replacement,
        bench_queue_throughput,
        bench_client_round_trip,
);

criterion_main!(store_benches);
