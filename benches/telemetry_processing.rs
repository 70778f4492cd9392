//! Benchmarks for the per-cycle hot paths: region decode, value formatting and
//! history updates
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use hwinfo_deck::format::{format_value, group_thousands};
use hwinfo_deck::hwinfo::image::RegionImageBuilder;
use hwinfo_deck::hwinfo::{decode, required_length};
use hwinfo_deck::tiles::ValueHistory;
use hwinfo_deck::types::ReadingType;

const TYPES: [ReadingType; 8] = [
    ReadingType::Temperature,
    ReadingType::Voltage,
    ReadingType::Fan,
    ReadingType::Current,
    ReadingType::Power,
    ReadingType::Clock,
    ReadingType::Usage,
    ReadingType::Other,
];

/// A region shaped like a busy desktop: `sensors` sensors with 40 readings each
fn region(sensors: u32) -> Vec<u8> {
    let mut builder = RegionImageBuilder::new();
    for s in 0..sensors {
        let index = builder.sensor(0xF000_0000 + s, 0, &format!("Sensor {}", s));
        for r in 0..40u32 {
            let reading_type = TYPES[(r as usize) % TYPES.len()];
            builder.reading(
                index,
                r,
                reading_type,
                &format!("Reading {}", r),
                "W",
                (s * 40 + r) as f64 * 1.25,
            );
        }
    }
    builder.build()
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("region_decode");

    for sensors in [4u32, 16, 64].iter() {
        let bytes = region(*sensors);
        group.throughput(Throughput::Bytes(bytes.len() as u64));
        group.bench_with_input(BenchmarkId::new("decode", sensors), &bytes, |b, bytes| {
            b.iter(|| decode(black_box(bytes)))
        });
        group.bench_with_input(
            BenchmarkId::new("required_length", sensors),
            &bytes,
            |b, bytes| b.iter(|| required_length(black_box(bytes))),
        );
    }

    group.finish();
}

fn bench_format(c: &mut Criterion) {
    let mut group = c.benchmark_group("format_value");

    group.bench_function("default_temperature", |b| {
        b.iter(|| format_value(black_box(54.6), ReadingType::Temperature, "°C", None))
    });
    group.bench_function("custom_precision", |b| {
        b.iter(|| format_value(black_box(3.14159), ReadingType::Clock, "GHz", Some("%.2f GHz")))
    });
    group.bench_function("grouped", |b| {
        b.iter(|| format_value(black_box(1234567.891), ReadingType::Other, "", Some("%,.2f")))
    });
    group.bench_function("group_thousands", |b| {
        b.iter(|| group_thousands(black_box("-1234567890.125")))
    });

    group.finish();
}

fn bench_history(c: &mut Criterion) {
    let mut group = c.benchmark_group("value_history");

    for capacity in [72usize, 1000].iter() {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("push", capacity), capacity, |b, &capacity| {
            let mut history = ValueHistory::new(capacity);
            let mut i = 0u64;
            b.iter(|| {
                history.push(black_box(i as f64));
                i = i.wrapping_add(1);
            });
        });
        group.bench_with_input(BenchmarkId::new("range", capacity), capacity, |b, &capacity| {
            let mut history = ValueHistory::new(capacity);
            for i in 0..capacity {
                history.push(i as f64);
            }
            b.iter(|| black_box(&history).range());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_decode, bench_format, bench_history);
criterion_main!(benches);
