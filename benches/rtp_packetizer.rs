use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use h264_rtp_streamer::rtp::{RtpHeader, RtpPacketizer, TimestampGenerator, TimestampMode};

fn create_access_unit(size: usize) -> Vec<u8> {
    let mut unit = vec![0x00, 0x00, 0x00, 0x01, 0x65]; // start code + IDR NAL header
    unit.extend((0..size).map(|i| (i % 256) as u8));
    unit
}

fn benchmark_packetize(c: &mut Criterion) {
    let mut group = c.benchmark_group("packetize");

    // Typical H.264 access unit sizes at 640x480, 4 Mbit/s
    for size in [1_000, 15_000, 50_000, 200_000].iter() {
        let unit = create_access_unit(*size);
        let mut packetizer = RtpPacketizer::new(96, 0x12345678, 1400);

        group.bench_with_input(BenchmarkId::new("access_unit_size", size), &unit, |b, unit| {
            b.iter(|| packetizer.packetize(black_box(unit), black_box(90000)));
        });
    }

    group.finish();
}

fn benchmark_header(c: &mut Criterion) {
    let header = RtpHeader::new(96, 4242, 90000, 0x12345678);
    let bytes = header.to_bytes();

    c.bench_function("header_to_bytes", |b| {
        b.iter(|| black_box(header).to_bytes());
    });
    c.bench_function("header_from_bytes", |b| {
        b.iter(|| RtpHeader::from_bytes(black_box(&bytes)));
    });
}

fn benchmark_timestamp_generation(c: &mut Criterion) {
    let ts_gen = TimestampGenerator::new(TimestampMode::VideoClock, 30);

    c.bench_function("timestamp_video_clock_30fps", |b| {
        b.iter(|| ts_gen.timestamp_for(black_box(123_456)));
    });
}

criterion_group!(benches, benchmark_packetize, benchmark_header, benchmark_timestamp_generation);
criterion_main!(benches);
