//! Routes records from the `log` facade into a staged logger.
//!
//! Each facade record becomes one staged record with the format
//! `"{}: {}"`, carrying the target and the rendered message as strings.

use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

use crate::arg::{LogArg, Value};
use crate::level::Category;
use crate::logger::{Logger, ThreadContext};

pub const BRIDGE_FORMAT: &str = "{}: {}";

pub struct LogBridge {
    logger: Logger,
    category: Category,
}

impl LogBridge {
    pub fn new(logger: Logger) -> Self {
        Self::with_category(logger, Category::DEFAULT)
    }

    pub fn with_category(logger: Logger, category: Category) -> Self {
        Self { logger, category }
    }

    /// Installs this bridge as the global `log` logger.
    pub fn install(self, max_level: LevelFilter) -> Result<(), SetLoggerError> {
        log::set_boxed_logger(Box::new(self))?;
        log::set_max_level(max_level);
        Ok(())
    }
}

impl Log for LogBridge {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        self.logger.is_enabled(self.category, metadata.level().into())
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        // Bridged records never carry pool slots.
        let mut ctx = ThreadContext::new();
        let target = record.target();
        let message = record.args();
        let args = [LogArg::Value(Value::Str(target)), LogArg::display(message)];
        self.logger
            .log(&mut ctx, record.level().into(), self.category, BRIDGE_FORMAT, &args);
    }

    fn flush(&self) {
        self.logger.flush();
    }
}
