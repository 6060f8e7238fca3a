use criterion::{black_box, criterion_group, criterion_main, Criterion};
use staged_logger::{log_record, Category, Level, Logger, RecordMeta, RingBuffer, Shown, ThreadContext};
use std::sync::Arc;

const RING_SIZE: usize = 4 * 1024 * 1024;

#[derive(Debug)]
struct TestEvent {
    id: i32,
    active: bool,
    large_number: u64,
}

impl std::fmt::Display for TestEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Event[id={}, active={}, large_number={}]", self.id, self.active, self.large_number)
    }
}

// Keeps the ring from filling up during a measurement.
fn drain_if_needed(ring: &RingBuffer) {
    if ring.used_bytes() > RING_SIZE / 2 {
        ring.drain(&mut |_: &RecordMeta, _: &[u8]| {});
    }
}

fn bench_staging(c: &mut Criterion) {
    let ring = Arc::new(RingBuffer::new(RING_SIZE));
    let logger = Logger::new("bench", ring.clone());
    let mut ctx = ThreadContext::new();

    let mut group = c.benchmark_group("staging");

    group.bench_function("primitives", |b| {
        b.iter(|| {
            log_record!(
                logger,
                &mut ctx,
                Level::Info,
                Category::DEFAULT,
                "idx:{}, num:{}, {}, {}",
                black_box(3i32),
                black_box(7i32),
                black_box(2.4232f32),
                black_box(true),
            );
            drain_if_needed(&ring);
        })
    });

    group.bench_function("string_argument", |b| {
        let user = String::from("someone@example.com");
        b.iter(|| {
            log_record!(logger, &mut ctx, Level::Info, Category::DEFAULT, "login by {}", black_box(&user));
            drain_if_needed(&ring);
        })
    });

    group.bench_function("pooled_slots", |b| {
        b.iter(|| {
            let count = ctx.no_boxing(black_box(42u64)).unwrap();
            let ratio = ctx.no_boxing(black_box(-1.5f64)).unwrap();
            log_record!(logger, &mut ctx, Level::Info, Category::DEFAULT, "{} {}", count, ratio);
            drain_if_needed(&ring);
        })
    });

    group.bench_function("display_fallback", |b| {
        let event = TestEvent { id: 1, active: true, large_number: 1 << 40 };
        b.iter(|| {
            log_record!(logger, &mut ctx, Level::Info, Category::DEFAULT, "{}", Shown(&event));
            drain_if_needed(&ring);
        })
    });

    group.bench_function("filtered", |b| {
        ring.set_level_enabled(Level::Verbose, false);
        b.iter(|| {
            log_record!(logger, &mut ctx, Level::Verbose, Category::DEFAULT, "never {}", black_box(1i32))
        })
    });

    group.finish();
}

criterion_group!(benches, bench_staging);
criterion_main!(benches);
