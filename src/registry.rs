//! Process-wide table of named loggers.
//!
//! Loggers are usable without registering them; the registry only exists so
//! that code far from where a logger was built can find it by name or id.
//! Lookups take a read lock and clone the handle.

use std::collections::HashMap;

use lazy_static::lazy_static;
use parking_lot::RwLock;

use crate::error::ConfigError;
use crate::logger::Logger;

lazy_static! {
    static ref LOGGERS: RwLock<HashMap<String, Logger>> = RwLock::new(HashMap::new());
}

/// Registers `logger` under its name.
pub fn register_logger(logger: Logger) -> Result<(), ConfigError> {
    let mut loggers = LOGGERS.write();
    if loggers.contains_key(logger.name()) {
        return Err(ConfigError::DuplicateLogger(logger.name().to_string()));
    }
    loggers.insert(logger.name().to_string(), logger);
    Ok(())
}

/// Removes and returns the logger registered under `name`.
pub fn unregister_logger(name: &str) -> Option<Logger> {
    LOGGERS.write().remove(name)
}

pub fn logger_by_name(name: &str) -> Option<Logger> {
    LOGGERS.read().get(name).cloned()
}

pub fn logger_by_id(id: u64) -> Option<Logger> {
    LOGGERS.read().values().find(|l| l.id() == id).cloned()
}

/// Names of all registered loggers, sorted.
pub fn logger_names() -> Vec<String> {
    let mut names: Vec<String> = LOGGERS.read().keys().cloned().collect();
    names.sort();
    names
}

/// Flushes every registered logger and returns how many there were.
///
/// The loggers are collected first, so a sink that looks up the registry
/// while flushing does not deadlock.
pub fn force_flush_all() -> usize {
    let loggers: Vec<Logger> = LOGGERS.read().values().cloned().collect();
    for logger in &loggers {
        logger.flush();
    }
    loggers.len()
}
