use staged_logger::tag::{format_block_size, utf16_len};
use staged_logger::{
    log_record, AllocError, ArgTag, Category, DecodedRecord, DecodedValue, Level, LogArg, Loggable, Logger,
    RecordMeta, RingBuffer, Staged, ThreadContext, Value,
};
use std::cell::Cell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

fn collect(ring: &RingBuffer) -> Vec<(RecordMeta, Vec<u8>)> {
    let mut out = Vec::new();
    ring.drain(&mut |meta: &RecordMeta, payload: &[u8]| out.push((*meta, payload.to_vec())));
    out
}

fn setup(capacity: usize) -> (Logger, Arc<RingBuffer>, ThreadContext) {
    let ring = Arc::new(RingBuffer::new(capacity));
    let logger = Logger::new("staging-tests", ring.clone());
    (logger, ring, ThreadContext::new())
}

#[test]
fn test_mixed_arguments_scenario() {
    let (logger, ring, mut ctx) = setup(4096);
    let format = "idx:{}, num:{}, {}, {}";

    let staged = logger
        .try_log(
            &mut ctx,
            Level::Info,
            Category::DEFAULT,
            format,
            &[
                LogArg::Value(Value::Int32(3)),
                LogArg::Value(Value::Int32(7)),
                LogArg::Value(Value::Float32(2.4232)),
                LogArg::Value(Value::Bool(true)),
            ],
        )
        .unwrap();

    let fmt_size = format_block_size(utf16_len(format)) as usize;
    let expected = fmt_size + 8 + 8 + 8 + 4;
    assert_eq!(staged, Staged::Committed { bytes: expected });

    let records = collect(&ring);
    assert_eq!(records.len(), 1);
    let (meta, payload) = &records[0];
    assert_eq!(payload.len(), expected);
    assert_eq!(meta.level, Level::Info);

    let decoded = DecodedRecord::decode(payload).unwrap();
    assert_eq!(decoded.format, format);
    assert_eq!(
        decoded.tags(),
        vec![ArgTag::Int32, ArgTag::Int32, ArgTag::Float32, ArgTag::Bool]
    );
    assert_eq!(
        decoded.values,
        vec![
            DecodedValue::Int32(3),
            DecodedValue::Int32(7),
            DecodedValue::Float32(2.4232),
            DecodedValue::Bool(true),
        ]
    );
    assert_eq!(decoded.render(), "idx:3, num:7, 2.4232, true");
}

#[test]
fn test_macro_matches_explicit_arguments() {
    let (logger, ring, mut ctx) = setup(4096);
    let name = String::from("disk0");
    let missing: Option<i64> = None;

    assert!(log_record!(
        logger,
        &mut ctx,
        Level::Warning,
        Category::DEFAULT,
        "{} at {}% ({}) {}",
        name,
        97u8,
        missing,
        'Z',
    ));

    let records = collect(&ring);
    let decoded = DecodedRecord::decode(&records[0].1).unwrap();
    assert_eq!(
        decoded.tags(),
        vec![ArgTag::Utf16String, ArgTag::UInt8, ArgTag::Null, ArgTag::Char16]
    );
    assert_eq!(decoded.render(), "disk0 at 97% (null) Z");
}

#[test]
fn test_filtered_call_writes_nothing() {
    let (logger, ring, mut ctx) = setup(4096);
    ring.set_level_enabled(Level::Verbose, false);

    let slot = ctx.no_boxing(5i32).unwrap();
    assert!(!logger.verbose(&mut ctx, "hidden {}", &[slot.into()]));
    assert_eq!(
        logger
            .try_log(&mut ctx, Level::Info, Category(3), "no such category", &[])
            .unwrap(),
        Staged::Filtered
    );

    assert!(collect(&ring).is_empty());
    assert_eq!(ctx.pool().outstanding(), 0);
}

#[test]
fn test_aborted_session_leaves_no_record() {
    let (logger, ring, mut ctx) = setup(64);
    let big = "x".repeat(100);
    let slot = ctx.no_boxing(1.0f64).unwrap();

    assert!(!logger.info(&mut ctx, "{} {}", &[big.to_arg(), slot.into()]));
    assert_eq!(collect(&ring).len(), 0);
    assert_eq!(ctx.pool().outstanding(), 0);
    assert_eq!(ring.refused_records(), 1);
}

#[test]
fn test_full_ring_drops_then_recovers_after_drain() {
    let (logger, ring, mut ctx) = setup(64);
    // 4 + 2*10 -> 24 bytes of format block, 12 for the i64.
    let format = "0123456789";
    let mut committed = 0;
    let mut dropped = 0;
    for i in 0..4i64 {
        match logger
            .try_log(&mut ctx, Level::Info, Category::DEFAULT, format, &[LogArg::Value(Value::Int64(i))])
            .unwrap()
        {
            Staged::Committed { bytes } => {
                assert_eq!(bytes, 36);
                committed += 1;
            }
            Staged::Dropped(AllocError::Full { requested }) => {
                assert_eq!(requested, 36);
                dropped += 1;
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }
    assert_eq!((committed, dropped), (1, 3));

    assert_eq!(collect(&ring).len(), 1);
    assert!(logger.info(&mut ctx, format, &[LogArg::Value(Value::Int64(9))]));
}

#[test]
fn test_frame_metadata_carries_level_and_category() {
    let ring = Arc::new(RingBuffer::with_categories(1024, 3));
    let logger = Logger::with_categories(
        "meta",
        ring.clone(),
        vec!["net".into(), "disk".into()],
        0,
    );
    let mut ctx = ThreadContext::new();
    let disk = logger.category("disk").unwrap();

    assert!(logger.log(&mut ctx, Level::Error, disk, "io error", &[]));
    assert!(logger.fatal(&mut ctx, "bye", &[]));

    let records = collect(&ring);
    assert_eq!(records[0].0.level, Level::Error);
    assert_eq!(records[0].0.category, disk);
    assert_eq!(records[1].0.level, Level::Fatal);
    assert_eq!(records[1].0.category, Category::DEFAULT);
    assert!(records[0].0.sequence < records[1].0.sequence);
}

/// Panics the second time it is rendered, i.e. in the encode pass.
struct FailsWhileEncoding(Cell<u32>);

impl fmt::Display for FailsWhileEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let calls = self.0.get() + 1;
        self.0.set(calls);
        if calls == 2 {
            panic!("render failed");
        }
        f.write_str("sized fine")
    }
}

#[test]
fn test_panic_while_encoding_does_not_wedge_the_ring() {
    let (logger, ring, mut ctx) = setup(256);
    let flaky = FailsWhileEncoding(Cell::new(0));

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        logger.try_log(&mut ctx, Level::Info, Category::DEFAULT, "{}", &[LogArg::display(&flaky)])
    }));
    assert!(outcome.is_err());
    assert_eq!(ring.abandoned_records(), 1);
    assert_eq!(ctx.pool().outstanding(), 0);

    // Enough rounds to wrap the ring several times over.
    for i in 0..20i64 {
        let staged = logger
            .try_log(&mut ctx, Level::Info, Category::DEFAULT, "round {}", &[LogArg::Value(Value::Int64(i))])
            .unwrap();
        assert!(staged.is_committed(), "round {i}: {staged:?}");

        let records = collect(&ring);
        assert_eq!(records.len(), 1);
        let decoded = DecodedRecord::decode(&records[0].1).unwrap();
        assert_eq!(decoded.values, vec![DecodedValue::Int64(i)]);
    }
    assert_eq!(ring.used_bytes(), 0);
    assert_eq!(ring.pending_records(), 0);
}
