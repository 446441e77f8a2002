//! Benchmarks for fan-in coordination and dispatch

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use dispatch::testing::MockTransport;
use dispatch::{DispatchRuntimeBuilder, Endpoint};
use fanout_core::FanoutCoordinator;
use std::sync::Arc;
use std::time::Duration;

fn bench_sequential_reports(c: &mut Criterion) {
    let mut group = c.benchmark_group("sequential_reports");

    for fanout in [1usize, 8, 64, 512].iter() {
        group.throughput(Throughput::Elements(*fanout as u64));
        group.bench_with_input(BenchmarkId::from_parameter(fanout), fanout, |b, &n| {
            b.iter(|| {
                let coord = FanoutCoordinator::<usize>::new(n);
                for slot in 0..n {
                    coord.report(slot, slot).unwrap();
                }
                coord
            })
        });
    }

    group.finish();
}

fn bench_threaded_fan_in(c: &mut Criterion) {
    let mut group = c.benchmark_group("threaded_fan_in");

    for threads in [2usize, 4, 8, 16].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(threads), threads, |b, &n| {
            b.iter(|| {
                let coord = FanoutCoordinator::<usize>::new(n);
                let handles: Vec<_> = (0..n)
                    .map(|slot| {
                        let coord = Arc::clone(&coord);
                        std::thread::spawn(move || coord.report(slot, slot).unwrap())
                    })
                    .collect();
                coord.wait();
                for handle in handles {
                    handle.join().unwrap();
                }
            })
        });
    }

    group.finish();
}

fn bench_mock_dispatch(c: &mut Criterion) {
    let runtime = DispatchRuntimeBuilder::new()
        .io_threads(4)
        .max_in_flight(4096)
        .build()
        .unwrap();
    let dispatcher = runtime.dispatcher(MockTransport::new());

    let mut group = c.benchmark_group("mock_dispatch");

    for endpoints in [1usize, 4, 16].iter() {
        let targets: Vec<Endpoint> = (0..*endpoints)
            .map(|i| Endpoint::new(format!("ep-{}", i), format!("10.0.0.{}:53", i)))
            .collect();

        group.throughput(Throughput::Elements(*endpoints as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(endpoints),
            &targets,
            |b, targets| {
                b.iter(|| {
                    let fanout = dispatcher
                        .dispatch(targets.clone(), "example.com".to_string())
                        .unwrap();
                    assert!(fanout.wait_timeout(Duration::from_secs(5)));
                })
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_sequential_reports,
    bench_threaded_fan_in,
    bench_mock_dispatch,
);
criterion_main!(benches);
