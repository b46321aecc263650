//! Frame encode/decode throughput for small and medium payloads

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use strand_codec::{decode, encode, WireEnvelope};
use strand_types::{atom, Aid, CtxId, Message, Request, Tag};

fn envelope(payload_len: usize) -> WireEnvelope {
    let from = Aid::new(CtxId::from_name("n0"), 0, 1, 1);
    let to = Aid::new(CtxId::from_name("n1"), 3, 7, 2);
    WireEnvelope::new(
        to,
        Tag::Request(Request { sid: 1, from }),
        Message::from_bytes(atom("bench"), vec![0xAB; payload_len]),
    )
}

fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("envelope_frame");
    for len in [0usize, 64, 4096] {
        let env = envelope(len);
        group.bench_with_input(BenchmarkId::new("encode", len), &env, |b, env| {
            b.iter(|| encode(black_box(env)))
        });
        let frame = encode(&env).unwrap();
        group.bench_with_input(BenchmarkId::new("decode", len), &frame, |b, frame| {
            b.iter(|| decode(black_box(frame.clone())))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_codec);
criterion_main!(benches);
