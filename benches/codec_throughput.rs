//! Transport codec throughput benchmark.
//!
//! Measures frame write/read latency and full request encode+frame cost.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use onebox_core::transport::codec::{
    decode, encode, read_frame, write_frame, RpcRequest, FRAME_REQUEST,
};
use std::io::Cursor;

const MAX_FRAME: u32 = 4 * 1024 * 1024;

fn bench_write_frame(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let payload_sizes: &[usize] = &[0, 64, 1024, 65536];

    let mut group = c.benchmark_group("write_frame");
    for &size in payload_sizes {
        let payload = vec![0xABu8; size];
        group.bench_with_input(BenchmarkId::from_parameter(size), &payload, |b, p| {
            b.iter(|| {
                rt.block_on(async {
                    let mut buf = Vec::with_capacity(size + 5);
                    write_frame(&mut buf, FRAME_REQUEST, black_box(p)).await.unwrap();
                    buf
                })
            });
        });
    }
    group.finish();
}

fn bench_request_round_trip(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let request = RpcRequest {
        id: "bench-1".to_string(),
        service: "onebox-history".to_string(),
        method: "Describe".to_string(),
        body: serde_json::json!({"shard": 7, "filter": "open"}),
    };

    c.bench_function("request_round_trip", |b| {
        b.iter(|| {
            rt.block_on(async {
                let payload = encode(black_box(&request)).unwrap();
                let mut buf = Vec::with_capacity(payload.len() + 5);
                write_frame(&mut buf, FRAME_REQUEST, &payload).await.unwrap();
                let frame = read_frame(&mut Cursor::new(buf), MAX_FRAME)
                    .await
                    .unwrap()
                    .unwrap();
                decode::<RpcRequest>(&frame.payload).unwrap()
            })
        });
    });
}

criterion_group!(benches, bench_write_frame, bench_request_round_trip);
criterion_main!(benches);
