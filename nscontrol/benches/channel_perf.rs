//! Channel and state store throughput benchmarks

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use nscontrol::{Control, ObserverDelta, SettingsDelta, ShmControl};
use nscontrol_common::config::SegmentConfig;
use nscontrol_common::shm::layout::ClientType;
use std::hint::black_box;

fn bench_config(tag: &str) -> SegmentConfig {
    SegmentConfig::named(format!("nsc_bench_{tag}_{}", std::process::id()))
}

/// Benchmark one command through the queue channel
fn bench_queue_round_trip(c: &mut Criterion) {
    let config = bench_config("queue");
    let engine = ShmControl::open(&config, ClientType::Engine).unwrap();
    let console = ShmControl::open(&config, ClientType::Console).unwrap();
    engine.connect().unwrap();

    let mut group = c.benchmark_group("queue_round_trip");
    for size in [16usize, 128, 512] {
        let payload = vec![b'c'; size];
        group.bench_with_input(BenchmarkId::from_parameter(size), &payload, |b, payload| {
            b.iter(|| {
                console.write(black_box(payload)).unwrap();
                black_box(engine.read().unwrap());
            });
        });
    }
    group.finish();
}

/// Benchmark write fan-out to many connected consoles
fn bench_queue_fan_out(c: &mut Criterion) {
    let config = bench_config("fan_out");
    let engine = ShmControl::open(&config, ClientType::Engine).unwrap();
    let consoles: Vec<_> = (0..16)
        .map(|_| {
            let console = ShmControl::open(&config, ClientType::Console).unwrap();
            console.connect().unwrap();
            console
        })
        .collect();

    c.bench_function("queue_fan_out_16", |b| {
        b.iter(|| {
            black_box(engine.write(b"select saturn").unwrap());
        });
    });
    drop(consoles);
}

/// Benchmark the realtime ring
fn bench_ring_round_trip(c: &mut Criterion) {
    let config = bench_config("ring");
    let writer = ShmControl::open(&config, ClientType::Engine).unwrap();
    let reader = ShmControl::open(&config, ClientType::Console).unwrap();

    c.bench_function("ring_round_trip", |b| {
        b.iter(|| {
            writer.write_rt(black_box(b"pan 0.1 0.0")).unwrap();
            black_box(reader.read_rt().unwrap());
        });
    });
}

/// Benchmark a merge followed by a publish
fn bench_state_publish(c: &mut Criterion) {
    let config = bench_config("state");
    let control = ShmControl::open(&config, ClientType::Engine).unwrap();
    let observer = ObserverDelta {
        heading: Some(90.0),
        ..Default::default()
    };
    let settings = SettingsDelta {
        field_of_view: Some(45.0),
        ..Default::default()
    };

    c.bench_function("merge_and_publish", |b| {
        b.iter(|| {
            control.set_observer(black_box(&observer)).unwrap();
            control.set_settings(black_box(&settings)).unwrap();
            control.publish().unwrap();
        });
    });

    c.bench_function("snapshot_settings", |b| {
        b.iter(|| black_box(control.settings().unwrap()));
    });
}

criterion_group!(
    benches,
    bench_queue_round_trip,
    bench_queue_fan_out,
    bench_ring_round_trip,
    bench_state_publish
);
criterion_main!(benches);
