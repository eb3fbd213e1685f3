//! CAN 帧编解码基准测试

use commlink_can::{CanFlags, CanFrame, decode_id, encode_id};
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

fn bench_id_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("id_codec");

    group.bench_function("encode_standard", |b| {
        b.iter(|| black_box(encode_id(black_box(0x123), CanFlags::empty())))
    });

    group.bench_function("encode_extended_rtr", |b| {
        b.iter(|| {
            black_box(encode_id(
                black_box(0x1ABC_DEF0),
                CanFlags::EXTENDED | CanFlags::REMOTE_REQUEST,
            ))
        })
    });

    group.bench_function("decode", |b| {
        b.iter(|| black_box(decode_id(black_box(0x9ABC_DEF0))))
    });

    group.finish();
}

fn bench_frame_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_codec");

    for len in [0usize, 4, 8] {
        let payload = vec![0xA5u8; len];
        let frame = CanFrame::new(0x321, CanFlags::empty(), &payload).unwrap();
        let wire = frame.encode();

        group.bench_with_input(BenchmarkId::new("encode", len), &frame, |b, frame| {
            b.iter(|| black_box(frame.encode()))
        });
        group.bench_with_input(BenchmarkId::new("decode", len), &wire, |b, wire| {
            b.iter(|| black_box(CanFrame::decode(black_box(wire)).unwrap()))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_id_codec, bench_frame_codec);
criterion_main!(benches);
