//! Flatten throughput benchmark
//!
//! Measures the batch reconstruction hot path: raw log decoding, shadow
//! stack replay, filtering and CSV encoding, for logs of increasing size.
//!
//! # Run Instructions
//!
//! ```bash
//! cargo bench --bench flatten_throughput
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use shadowtrace::config::TraceConfig;
use shadowtrace::event::Event;
use shadowtrace::flatten::{Flattener, OutputFormat, Reconstruction};
use shadowtrace::frame::{Frame, MethodLevel};
use shadowtrace::raw_log::RawLogWriter;
use shadowtrace::session::Sink;
use std::io::Write;
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
struct Capture(Arc<Mutex<Vec<u8>>>);

impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0
            .lock()
            .map_err(|_| std::io::Error::other("poisoned"))?
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// A request-shaped session: controller -> library layer -> model calls
fn bench_events(requests: usize) -> Vec<Event> {
    let controller = Frame::new("OrdersController", "index", MethodLevel::Instance, "/app/controllers/orders.rb", 4);
    let orm = Frame::new("Relation", "load", MethodLevel::Instance, "/gems/orm/relation.rb", 120);
    let model = Frame::new("Order", "total", MethodLevel::Instance, "/app/models/order.rb", 18);

    let mut events = Vec::with_capacity(requests * 9);
    for i in 0..requests {
        events.push(Event::call(controller.clone()));
        events.push(Event::call(orm.clone()));
        for _ in 0..2 {
            events.push(Event::call(model.clone()));
            events.push(Event::ret(model.clone()));
        }
        events.push(Event::ret(orm.clone()));
        events.push(Event::ret(controller.clone()));
        events.push(Event::mark(format!("request {}", i)));
    }
    events
}

fn raw_log(events: &[Event]) -> Vec<u8> {
    let capture = Capture::default();
    let mut log = RawLogWriter::new(Sink::from_writer(capture.clone())).unwrap();
    for event in events {
        log.record(event).unwrap();
    }
    log.close().unwrap();
    let bytes = capture.0.lock().unwrap().clone();
    bytes
}

fn exclude_gems() -> TraceConfig {
    TraceConfig {
        exclude_patterns: vec!["/gems/".to_string()],
        ..TraceConfig::default()
    }
}

/// Benchmark: attribution only, no decoding or encoding
fn bench_reconstruction(c: &mut Criterion) {
    let events = bench_events(1_000);
    let config = exclude_gems();

    c.bench_function("reconstruction_observe_9k_events", |b| {
        b.iter(|| {
            let mut pass = Reconstruction::new(&config).unwrap();
            let mut emitted = 0usize;
            for event in events.iter().cloned() {
                if pass.observe(black_box(event)).is_some() {
                    emitted += 1;
                }
            }
            emitted
        });
    });
}

/// Benchmark: full flatten pass from raw CSV bytes to CSV output
fn bench_flatten_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("flatten_csv");
    let config = exclude_gems();

    for requests in [100usize, 1_000, 10_000] {
        let raw = raw_log(&bench_events(requests));
        group.throughput(Throughput::Bytes(raw.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(requests), &raw, |b, raw| {
            b.iter(|| {
                let mut flattener =
                    Flattener::new(Sink::from_writer(std::io::sink()), &config, OutputFormat::Csv)
                        .unwrap();
                let summary = flattener.flatten(black_box(raw.as_slice())).unwrap();
                flattener.close().unwrap();
                summary
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_reconstruction, bench_flatten_sizes);
criterion_main!(benches);
