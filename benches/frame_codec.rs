//! Frame codec benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use fuel_terminal::{
    build_read_frame, build_write_frame, compute_crc, decode_request, verify_crc, FrameBuilder,
    MeterReading,
};

/// Read response carrying `count` registers
fn read_response(count: u16) -> Vec<u8> {
    let registers: Vec<u16> = (0..count).map(|i| i.wrapping_mul(257)).collect();
    FrameBuilder::new()
        .address(1)
        .unwrap()
        .function_code(0x03)
        .unwrap()
        .byte((count * 2) as u8)
        .unwrap()
        .registers(&registers)
        .unwrap()
        .build()
        .unwrap()
        .as_slice()
        .to_vec()
}

fn bench_crc(c: &mut Criterion) {
    let mut group = c.benchmark_group("crc");
    for count in [1u16, 6, 32] {
        let frame = read_response(count);
        group.bench_with_input(BenchmarkId::new("compute", frame.len()), &frame, |b, f| {
            b.iter(|| compute_crc(black_box(f)))
        });
        group.bench_with_input(BenchmarkId::new("verify", frame.len()), &frame, |b, f| {
            b.iter(|| verify_crc(black_box(f)))
        });
    }
    group.finish();
}

fn bench_requests(c: &mut Criterion) {
    c.bench_function("build_write_frame", |b| {
        b.iter(|| build_write_frame(black_box(1), black_box(0), black_box(1)))
    });
    c.bench_function("build_read_frame", |b| {
        b.iter(|| build_read_frame(black_box(1), black_box(1), black_box(6)))
    });

    let echo = build_write_frame(1, 0, 1);
    c.bench_function("decode_request", |b| {
        b.iter(|| decode_request(black_box(echo.as_slice())))
    });
}

fn bench_meter_decode(c: &mut Criterion) {
    let registers = [0x0002u16, 0, 1234, 0, 10_000, 500];
    c.bench_function("meter_reading_from_registers", |b| {
        b.iter(|| MeterReading::from_registers(black_box(&registers)))
    });
}

criterion_group!(benches, bench_crc, bench_requests, bench_meter_decode);
criterion_main!(benches);
