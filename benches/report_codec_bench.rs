//! Performance benchmarks for the HID report codec and the client line codec.
//!
//! The card sends an INPUT report every few milliseconds and every report
//! goes through `Report::decode`, so decoding sits on the hot path of the
//! card-owner task.
//!
//! Run benchmarks with:
//! ```sh
//! cargo bench --bench report_codec_bench
//! ```

use bytes::BytesMut;
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use tokio_util::codec::Decoder;

use open8055_protocol::{CommandParser, InputReport, LineCodec, OutputReport, Report};

fn sample_input() -> Report {
    Report::Input(InputReport {
        input_bits: 0b1_0101,
        counters: [12, 0, 65535, 7, 300],
        adc: [512, 1023],
    })
}

fn sample_output() -> Report {
    Report::Output(OutputReport {
        output_bits: 0xA5,
        values: [0, 100, 200, 300, 400, 500, 600, 700],
        pwm: [255, 1023],
        reset_counters: 0,
    })
}

fn bench_report_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("report_decode");
    group.throughput(Throughput::Elements(1));

    let raw = sample_input().encode();
    group.bench_function("decode_input_report", |b| {
        b.iter(|| black_box(Report::decode(black_box(&raw)).unwrap()));
    });

    group.finish();
}

fn bench_report_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("report_encode");
    group.throughput(Throughput::Elements(1));

    let report = sample_output();
    group.bench_function("encode_output_report", |b| {
        b.iter(|| black_box(black_box(&report).encode()));
    });

    group.finish();
}

/// Benchmark decoding batches of command lines from one buffer.
fn bench_line_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("line_decode");

    for batch in [1usize, 10, 100] {
        let stream: Vec<u8> = "SetOutputDigital 3 1\r\n"
            .repeat(batch)
            .into_bytes();
        group.throughput(Throughput::Elements(batch as u64));
        group.bench_with_input(BenchmarkId::from_parameter(batch), &stream, |b, stream| {
            b.iter(|| {
                let mut codec = LineCodec::new();
                let mut buffer = BytesMut::from(&stream[..]);
                while let Some(line) = codec.decode(&mut buffer).unwrap() {
                    black_box(CommandParser::parse(&line).unwrap());
                }
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_report_decode,
    bench_report_encode,
    bench_line_decode
);
criterion_main!(benches);
