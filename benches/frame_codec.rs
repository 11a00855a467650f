//! Frame codec benchmark suite.
//!
//! Measures the per-message cost of the framer and the handshake probes:
//! - Request encoding at several payload sizes
//! - Response and event decoding at the same sizes
//! - Hello payload parsing across the supported method-list shapes
//!
//! Run with: cargo bench --bench frame_codec
//! Results saved to: target/criterion/

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use gateway_client::RequestId;
use gateway_client::protocol::{
    EventFrame, Frame, HelloPayload, RequestFrame, ResponseFrame, decode, encode,
};
use serde_json::{Value, json};

// ============================================================================
// Benchmark Parameters
// ============================================================================

/// Number of session entries per payload.
const PAYLOAD_SIZES: &[usize] = &[1, 50, 500];

fn sessions_payload(count: usize) -> Value {
    let sessions: Vec<Value> = (0..count)
        .map(|i| {
            json!({
                "key": format!("agent:main:session-{i}"),
                "label": format!("Session {i}"),
                "updatedAt": 1_700_000_000_000_u64 + i as u64,
                "tokens": { "input": i * 10, "output": i * 20 },
            })
        })
        .collect();
    json!({ "sessions": sessions })
}

// ============================================================================
// Benchmark: Encode
// ============================================================================

fn bench_encode_request(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_request");

    for &size in PAYLOAD_SIZES {
        let params = sessions_payload(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &params, |b, params| {
            b.iter(|| {
                let frame = Frame::Request(RequestFrame::new("sessions.patch", params.clone()));
                black_box(encode(&frame).expect("encode"))
            });
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Decode
// ============================================================================

fn bench_decode_response(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_response");

    for &size in PAYLOAD_SIZES {
        let frame = Frame::Response(ResponseFrame::success(
            RequestId::generate(),
            sessions_payload(size),
        ));
        let message = encode(&frame).expect("encode");
        group.throughput(Throughput::Bytes(message.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &message, |b, message| {
            b.iter(|| black_box(decode(message).expect("decode")));
        });
    }

    group.finish();
}

fn bench_decode_event(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_event");

    for &size in PAYLOAD_SIZES {
        let frame = Frame::Event(EventFrame::new("sessions.changed", sessions_payload(size)));
        let message = encode(&frame).expect("encode");
        group.throughput(Throughput::Bytes(message.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &message, |b, message| {
            b.iter(|| black_box(decode(message).expect("decode")));
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Hello Parsing
// ============================================================================

fn bench_hello_probes(c: &mut Criterion) {
    let methods: Vec<String> = (0..64).map(|i| format!("group{}.method{i}", i % 8)).collect();
    let method_map: serde_json::Map<String, Value> =
        methods.iter().map(|m| (m.clone(), json!({}))).collect();

    let shapes = [
        ("features_list", json!({ "protocol": 3, "features": { "methods": methods } })),
        ("top_level_list", json!({ "protocol": 3, "methods": methods })),
        ("features_map", json!({ "version": 3, "features": { "methods": method_map } })),
        ("snapshot_list", json!({ "server": { "protocol": 3 }, "snapshot": { "methods": methods } })),
        ("no_methods", json!({ "protocol": 3 })),
    ];

    let mut group = c.benchmark_group("hello_probes");
    for (name, raw) in &shapes {
        group.bench_with_input(BenchmarkId::from_parameter(name), raw, |b, raw| {
            b.iter(|| black_box(HelloPayload::from_value(raw.clone())));
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_encode_request,
    bench_decode_response,
    bench_decode_event,
    bench_hello_probes
);
criterion_main!(benches);
