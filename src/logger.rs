use std::backtrace::Backtrace;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{error, info};

use crate::arg::LogArg;
use crate::engine::LogEngine;
use crate::error::UsageError;
use crate::level::{Category, Level};
use crate::pool::{SlotHandle, SlotPool, SlotValue};
use crate::session::{stage, Staged};

static NEXT_LOGGER_ID: AtomicU64 = AtomicU64::new(1);

/// Name of the category every logger starts with, at index 0.
pub const DEFAULT_CATEGORY: &str = "default";

/// Per-thread state a caller threads through its log calls.
///
/// Owns the calling thread's slot pool. Create one per thread and pass it by
/// `&mut` to every call; never share one between threads.
#[derive(Debug, Default)]
pub struct ThreadContext {
    pool: SlotPool,
}

impl ThreadContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parks a primitive in a pool slot and returns a handle that can be
    /// passed as a log argument.
    ///
    /// The handle is consumed by the next log call made with this context:
    /// either encoded and released, or reclaimed if it was not passed in.
    pub fn no_boxing<T: SlotValue>(&mut self, value: T) -> Result<SlotHandle, UsageError> {
        self.pool.no_boxing(value)
    }

    pub fn pool(&self) -> &SlotPool {
        &self.pool
    }

    pub fn pool_mut(&mut self) -> &mut SlotPool {
        &mut self.pool
    }
}

/// Front end of a log engine.
///
/// Cheap to clone; clones share the engine and configuration.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use staged_logger::{log_record, Category, Level, Logger, RingBuffer, ThreadContext};
///
/// let ring = Arc::new(RingBuffer::new(4096));
/// let logger = Logger::new("app", ring.clone());
/// let mut ctx = ThreadContext::new();
///
/// assert!(log_record!(logger, &mut ctx, Level::Info, Category::DEFAULT, "x={} ok={}", 3, true));
/// assert_eq!(ring.committed_records(), 1);
/// ```
#[derive(Clone)]
pub struct Logger {
    inner: Arc<LoggerInner>,
}

struct LoggerInner {
    id: u64,
    name: String,
    engine: Arc<dyn LogEngine>,
    categories: Vec<String>,
    print_stack_mask: u32,
}

impl Logger {
    /// Creates a logger with the single default category.
    pub fn new(name: impl Into<String>, engine: Arc<dyn LogEngine>) -> Self {
        Self::with_categories(name, engine, Vec::new(), 0)
    }

    /// Creates a logger with a category table and a bitmap of levels whose
    /// records carry a captured stack trace.
    ///
    /// The default category is put at index 0 if the table does not already
    /// start with it. An engine with a fixed category table must gate at least
    /// as many categories, e.g. `RingBuffer::with_categories(cap, table.len())`.
    ///
    /// # Panics
    ///
    /// If the engine reports fewer categories than the table holds; records
    /// in the missing categories would be filtered unconditionally.
    pub fn with_categories(
        name: impl Into<String>,
        engine: Arc<dyn LogEngine>,
        categories: Vec<String>,
        print_stack_mask: u32,
    ) -> Self {
        let categories = category_table(categories);
        if let Some(gated) = engine.category_count() {
            assert!(
                gated >= categories.len(),
                "engine gates {} categories but the logger table has {}",
                gated,
                categories.len()
            );
        }
        let id = NEXT_LOGGER_ID.fetch_add(1, Ordering::Relaxed);
        let name = name.into();
        info!(id, name = %name, categories = categories.len(), "logger created");

        Self {
            inner: Arc::new(LoggerInner {
                id,
                name,
                engine,
                categories,
                print_stack_mask,
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn engine(&self) -> &Arc<dyn LogEngine> {
        &self.inner.engine
    }

    pub fn categories(&self) -> &[String] {
        &self.inner.categories
    }

    /// Looks up a category by name.
    pub fn category(&self, name: &str) -> Option<Category> {
        self.inner
            .categories
            .iter()
            .position(|c| c == name)
            .map(|i| Category(i as u32))
    }

    pub fn is_enabled(&self, category: Category, level: Level) -> bool {
        self.inner.engine.enabled(category, level)
    }

    /// Stages one record and reports what happened to it.
    ///
    /// A `None` format is logged as the text `null`.
    pub fn try_log<'f>(
        &self,
        ctx: &mut ThreadContext,
        level: Level,
        category: Category,
        format: impl Into<Option<&'f str>>,
        args: &[LogArg<'_>],
    ) -> Result<Staged, UsageError> {
        let format = format.into().unwrap_or("null");
        let engine = self.inner.engine.as_ref();

        if self.inner.print_stack_mask & level.bit() != 0 && engine.enabled(category, level) {
            let with_stack = format!("{}\n{}", format, Backtrace::force_capture());
            return stage(engine, &mut ctx.pool, level, category, &with_stack, args);
        }
        stage(engine, &mut ctx.pool, level, category, format, args)
    }

    /// Stages one record. Returns true if it was committed.
    ///
    /// # Panics
    ///
    /// On pool misuse: a stale, released, duplicated or foreign slot handle.
    /// Use [`try_log`](Self::try_log) to get the error back instead.
    pub fn log<'f>(
        &self,
        ctx: &mut ThreadContext,
        level: Level,
        category: Category,
        format: impl Into<Option<&'f str>>,
        args: &[LogArg<'_>],
    ) -> bool {
        match self.try_log(ctx, level, category, format, args) {
            Ok(staged) => staged.is_committed(),
            Err(misuse) => {
                error!(logger = %self.inner.name, error = %misuse, "pool slot misused in log call");
                panic!("log call on '{}' misused a pool slot: {}", self.inner.name, misuse);
            }
        }
    }

    pub fn verbose(&self, ctx: &mut ThreadContext, format: &str, args: &[LogArg<'_>]) -> bool {
        self.log(ctx, Level::Verbose, Category::DEFAULT, format, args)
    }

    pub fn debug(&self, ctx: &mut ThreadContext, format: &str, args: &[LogArg<'_>]) -> bool {
        self.log(ctx, Level::Debug, Category::DEFAULT, format, args)
    }

    pub fn info(&self, ctx: &mut ThreadContext, format: &str, args: &[LogArg<'_>]) -> bool {
        self.log(ctx, Level::Info, Category::DEFAULT, format, args)
    }

    pub fn warning(&self, ctx: &mut ThreadContext, format: &str, args: &[LogArg<'_>]) -> bool {
        self.log(ctx, Level::Warning, Category::DEFAULT, format, args)
    }

    pub fn error(&self, ctx: &mut ThreadContext, format: &str, args: &[LogArg<'_>]) -> bool {
        self.log(ctx, Level::Error, Category::DEFAULT, format, args)
    }

    pub fn fatal(&self, ctx: &mut ThreadContext, format: &str, args: &[LogArg<'_>]) -> bool {
        self.log(ctx, Level::Fatal, Category::DEFAULT, format, args)
    }

    /// Asks the engine to push committed records to its consumer.
    pub fn flush(&self) {
        self.inner.engine.flush();
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("categories", &self.inner.categories)
            .finish()
    }
}

/// Category names as a logger indexes them: the default category first,
/// then the rest in their given order.
pub(crate) fn category_table(mut categories: Vec<String>) -> Vec<String> {
    categories.retain(|c| c != DEFAULT_CATEGORY);
    categories.insert(0, DEFAULT_CATEGORY.to_string());
    categories
}

/// Logs a record with the given format string and arguments.
///
/// Every argument goes through [`Loggable`](crate::Loggable), so primitives,
/// strings, `Option`s and pool slots can be mixed freely. Expands to
/// [`Logger::log`] and evaluates to whether the record was committed.
///
/// ```
/// # use std::sync::Arc;
/// # use staged_logger::{log_record, Category, Level, Logger, RingBuffer, ThreadContext};
/// # let logger = Logger::new("doc", Arc::new(RingBuffer::new(4096)));
/// let mut ctx = ThreadContext::new();
/// let retries = ctx.no_boxing(3u8).unwrap();
/// log_record!(logger, &mut ctx, Level::Warning, Category::DEFAULT, "retry {} of {}", retries, 5);
/// log_record!(logger, &mut ctx, Level::Info, Category::DEFAULT, "no arguments");
/// ```
#[macro_export]
macro_rules! log_record {
    ($logger:expr, $ctx:expr, $level:expr, $category:expr, $fmt:expr $(, $arg:expr)* $(,)?) => {
        $logger.log(
            $ctx,
            $level,
            $category,
            $fmt,
            &[$($crate::Loggable::to_arg(&$arg)),*],
        )
    };
}
