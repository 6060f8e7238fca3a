use staged_logger::{
    Category, DecodedRecord, DecodedValue, Level, Loggable, Logger, RecordMeta, RingBuffer, Staged,
    ThreadContext,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

const THREADS: u32 = 8;
const PER_THREAD: u64 = 400;

fn spawn_consumer(ring: Arc<RingBuffer>, done: Arc<AtomicBool>) -> thread::JoinHandle<Vec<DecodedRecord>> {
    thread::spawn(move || {
        let mut seen = Vec::new();
        let mut sink = |_: &RecordMeta, payload: &[u8]| {
            seen.push(DecodedRecord::decode(payload).expect("record decodes"));
        };
        loop {
            let finished = done.load(Ordering::Acquire);
            ring.drain(&mut sink);
            if finished {
                break;
            }
            thread::yield_now();
        }
        seen
    })
}

#[test]
fn test_concurrent_producers_never_interleave() {
    // Small enough that producers regularly run into a full ring.
    let ring = Arc::new(RingBuffer::new(8 * 1024));
    let logger = Logger::new("concurrency", ring.clone());
    let done = Arc::new(AtomicBool::new(false));
    let consumer = spawn_consumer(ring.clone(), done.clone());

    let producers: Vec<_> = (0..THREADS)
        .map(|t| {
            let logger = logger.clone();
            thread::spawn(move || {
                let mut ctx = ThreadContext::new();
                for seq in 0..PER_THREAD {
                    let marker = format!("worker-{t}-record-{seq}");
                    loop {
                        let id = ctx.no_boxing(t).unwrap();
                        let staged = logger
                            .try_log(
                                &mut ctx,
                                Level::Info,
                                Category::DEFAULT,
                                "thread {} seq {} marker {}",
                                &[id.into(), seq.to_arg(), marker.to_arg()],
                            )
                            .unwrap();
                        match staged {
                            Staged::Committed { .. } => break,
                            Staged::Dropped(_) => thread::yield_now(),
                            Staged::Filtered => panic!("nothing is filtered here"),
                        }
                    }
                }
                assert_eq!(ctx.pool().outstanding(), 0);
            })
        })
        .collect();

    for producer in producers {
        producer.join().unwrap();
    }
    done.store(true, Ordering::Release);
    let records = consumer.join().unwrap();

    assert_eq!(records.len(), (THREADS as u64 * PER_THREAD) as usize);
    let mut next_seq = vec![0u64; THREADS as usize];
    for record in &records {
        assert_eq!(record.format, "thread {} seq {} marker {}");
        let (t, seq, marker) = match record.values.as_slice() {
            [DecodedValue::UInt32(t), DecodedValue::UInt64(seq), DecodedValue::Text(marker)] => {
                (*t, *seq, marker.as_str())
            }
            other => panic!("corrupted record: {other:?}"),
        };
        assert_eq!(marker, format!("worker-{t}-record-{seq}"));
        // Per-thread order is preserved even though threads interleave.
        assert_eq!(seq, next_seq[t as usize]);
        next_seq[t as usize] += 1;
    }
    assert!(next_seq.iter().all(|&n| n == PER_THREAD));
    assert_eq!(ring.used_bytes(), 0);
}

#[test]
fn test_concurrent_filtered_and_dropped_calls_leave_no_trace() {
    let ring = Arc::new(RingBuffer::new(64));
    ring.set_level_enabled(Level::Debug, false);
    let logger = Logger::new("concurrency-refused", ring.clone());
    let oversized = "z".repeat(200);

    thread::scope(|scope| {
        for _ in 0..4 {
            let logger = &logger;
            let oversized = &oversized;
            scope.spawn(move || {
                let mut ctx = ThreadContext::new();
                for i in 0..100i32 {
                    let slot = ctx.no_boxing(i).unwrap();
                    assert!(!logger.debug(&mut ctx, "{}", &[slot.into()]));
                    let slot = ctx.no_boxing(i).unwrap();
                    assert!(!logger.info(&mut ctx, "{} {}", &[slot.into(), oversized.to_arg()]));
                }
                assert_eq!(ctx.pool().outstanding(), 0);
            });
        }
    });

    let mut drained = 0;
    ring.drain(&mut |_: &RecordMeta, _: &[u8]| drained += 1);
    assert_eq!(drained, 0);
    assert_eq!(ring.committed_records(), 0);
    assert_eq!(ring.refused_records(), 400);
}
