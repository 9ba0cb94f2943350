use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use crm_resilience::{
    AdmissionWindow, AsyncDispatchQueue, CounterKey, DispatchConfig, FnSink, MetricsAggregator,
    MetricsCollector, RequestDetails, RequestMetric, RequestStats,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Benchmark admission decisions on a window that never fills
fn bench_admission(c: &mut Criterion) {
    let mut group = c.benchmark_group("admission");
    group.throughput(Throughput::Elements(1000));

    group.bench_function("granted", |b| {
        b.iter(|| {
            let mut window = AdmissionWindow::new(1000, Duration::from_secs(60)).unwrap();
            let now = Instant::now();
            for _ in 0..1000 {
                black_box(window.try_admit(black_box(now)));
            }
        })
    });

    group.bench_function("saturated", |b| {
        let mut window = AdmissionWindow::new(100, Duration::from_secs(60)).unwrap();
        let now = Instant::now();
        for _ in 0..100 {
            window.try_admit(now);
        }
        b.iter(|| black_box(window.try_admit(black_box(now))))
    });

    group.finish();
}

/// Benchmark ring insertion once the ring is full and evicting
fn bench_ring_insertion(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring_insertion");

    for size in [100, 1000, 10_000].iter() {
        group.bench_with_input(BenchmarkId::new("window_size", size), size, |b, &size| {
            let aggregator = MetricsAggregator::new(size).unwrap();
            let now = Instant::now();
            for _ in 0..size {
                aggregator.add_request(RequestMetric::new(
                    RequestDetails::new("GET", "Account").with_status(200),
                    now,
                ));
            }

            b.iter(|| {
                aggregator.add_request(black_box(RequestMetric::new(
                    RequestDetails::new("GET", "Account").with_status(200),
                    now,
                )))
            })
        });
    }

    group.finish();
}

/// Benchmark statistics over full rings
fn bench_stats_computation(c: &mut Criterion) {
    let mut group = c.benchmark_group("stats");

    for size in [100, 1000].iter() {
        let now = Instant::now();
        let metrics: Vec<RequestMetric> = (0..*size)
            .map(|i| {
                RequestMetric::new(
                    RequestDetails::new("GET", format!("Entity{}", i % 10))
                        .with_status(if i % 7 == 0 { 500 } else { 200 })
                        .with_latency_ms((i % 300) as f64),
                    now,
                )
            })
            .collect();

        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::new("requests", size), &metrics, |b, metrics| {
            b.iter(|| black_box(RequestStats::compute(metrics.iter(), None)))
        });
    }

    group.finish();
}

/// Benchmark counter increments, single and multi-threaded
fn bench_counters(c: &mut Criterion) {
    let mut group = c.benchmark_group("counters");

    group.bench_function("key_fingerprint", |b| {
        b.iter(|| {
            CounterKey::new(
                black_box("api_calls"),
                [("entity", "Contact"), ("method", "GET"), ("status", "200")],
            )
            .fingerprint()
        })
    });

    group.bench_function("increment_existing", |b| {
        let collector = MetricsCollector::without_aggregation();
        b.iter(|| collector.increment_counter("api_calls", 1, [("entity", "Contact")]))
    });

    for num_threads in [2, 4, 8].iter() {
        group.throughput(Throughput::Elements((*num_threads as u64) * 1000));

        group.bench_with_input(
            BenchmarkId::new("threads", num_threads),
            num_threads,
            |b, &num_threads| {
                b.iter(|| {
                    let collector = MetricsCollector::without_aggregation();

                    let mut handles = vec![];
                    for i in 0..num_threads {
                        let collector = collector.clone();
                        let handle = std::thread::spawn(move || {
                            // Each thread uses its own label to avoid contention
                            let worker = format!("worker-{}", i);
                            for _ in 0..1000 {
                                black_box(collector.increment_counter(
                                    "jobs",
                                    1,
                                    [("worker", worker.as_str())],
                                ));
                            }
                        });
                        handles.push(handle);
                    }

                    for handle in handles {
                        handle.join().unwrap();
                    }
                })
            },
        );
    }

    group.finish();
}

/// Benchmark producer-side cost of handing items to the dispatch queue
fn bench_dispatch_submit(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch");

    group.bench_function("submit", |b| {
        let queue = Arc::new(
            AsyncDispatchQueue::new(
                FnSink::new(|item: u64| {
                    black_box(item);
                    Ok(())
                }),
                DispatchConfig::with_capacity(100_000),
            )
            .unwrap(),
        );
        b.iter(|| queue.submit(black_box(42)));
        queue.close();
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_admission,
    bench_ring_insertion,
    bench_stats_computation,
    bench_counters,
    bench_dispatch_submit,
);
criterion_main!(benches);
