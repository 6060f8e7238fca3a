//! Logger configuration.
//!
//! A config is plain data, read from TOML or assembled with the builder
//! methods, and turned into a [`Logger`] over a [`RingBuffer`] by
//! [`LoggerConfig::build`].
//!
//! ```toml
//! name = "server"
//! capacity = 1048576
//! levels = ["info", "warning", "error", "fatal"]
//! categories = ["net", "storage"]
//! disabled_categories = ["storage"]
//! print_stack_levels = ["fatal"]
//! diagnostics = "staged_logger=debug"
//! ```

use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use crate::diagnostics::DiagnosticsConfig;
use crate::error::ConfigError;
use crate::level::{Category, Level};
use crate::logger::{category_table, Logger};
use crate::ring_buffer::{RingBuffer, MIN_CAPACITY};

pub const DEFAULT_CAPACITY: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggerConfig {
    pub name: String,
    /// Ring buffer size in bytes.
    pub capacity: usize,
    /// Enabled levels. Records at any other level are filtered.
    pub levels: Vec<String>,
    /// Category names; `default` is always present at index 0.
    pub categories: Vec<String>,
    /// Categories that start disabled.
    pub disabled_categories: Vec<String>,
    /// Levels whose records get a stack trace appended.
    pub print_stack_levels: Vec<String>,
    /// `EnvFilter` directives for the crate's own diagnostics.
    pub diagnostics: Option<String>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            capacity: DEFAULT_CAPACITY,
            levels: Level::ALL.iter().map(|l| l.as_str().to_string()).collect(),
            categories: Vec::new(),
            disabled_categories: Vec::new(),
            print_stack_levels: Vec::new(),
            diagnostics: None,
        }
    }
}

impl LoggerConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_levels(mut self, levels: &[Level]) -> Self {
        self.levels = levels.iter().map(|l| l.as_str().to_string()).collect();
        self
    }

    pub fn with_category(mut self, name: impl Into<String>) -> Self {
        self.categories.push(name.into());
        self
    }

    pub fn with_disabled_category(mut self, name: impl Into<String>) -> Self {
        self.disabled_categories.push(name.into());
        self
    }

    pub fn with_print_stack_levels(mut self, levels: &[Level]) -> Self {
        self.print_stack_levels = levels.iter().map(|l| l.as_str().to_string()).collect();
        self
    }

    pub fn with_diagnostics(mut self, filter: impl Into<String>) -> Self {
        self.diagnostics = Some(filter.into());
        self
    }

    /// Bitmap of the enabled levels.
    pub fn level_mask(&self) -> Result<u32, ConfigError> {
        level_mask(&self.levels)
    }

    /// Bitmap of the levels that capture a stack trace.
    pub fn print_stack_mask(&self) -> Result<u32, ConfigError> {
        level_mask(&self.print_stack_levels)
    }

    /// Category names in index order.
    pub fn category_table(&self) -> Vec<String> {
        category_table(self.categories.clone())
    }

    /// Diagnostics settings, if the config asks for any.
    pub fn diagnostics_config(&self) -> Option<DiagnosticsConfig> {
        self.diagnostics
            .as_ref()
            .map(|filter| DiagnosticsConfig::new().with_filter(filter.clone()))
    }

    /// Validates the config and builds a logger over a fresh ring buffer.
    ///
    /// The ring is returned alongside so the caller can drain it.
    pub fn build(&self) -> Result<(Logger, Arc<RingBuffer>), ConfigError> {
        if self.capacity < MIN_CAPACITY {
            return Err(ConfigError::CapacityTooSmall(self.capacity));
        }
        let levels = self.level_mask()?;
        let stack_levels = self.print_stack_mask()?;
        let table = self.category_table();

        let ring = Arc::new(RingBuffer::with_categories(self.capacity, table.len()));
        ring.set_level_mask(levels);
        for name in &self.disabled_categories {
            let index = table
                .iter()
                .position(|c| c == name)
                .ok_or_else(|| ConfigError::UnknownCategory(name.clone()))?;
            ring.set_category_enabled(Category(index as u32), false);
        }

        let logger = Logger::with_categories(self.name.clone(), ring.clone(), table, stack_levels);
        Ok((logger, ring))
    }
}

fn level_mask(names: &[String]) -> Result<u32, ConfigError> {
    names.iter().try_fold(0u32, |mask, name| {
        let level: Level = name
            .parse()
            .map_err(|_| ConfigError::UnknownLevel(name.clone()))?;
        Ok(mask | level.bit())
    })
}
