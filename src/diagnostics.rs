//! Self-diagnostics of the logging core.
//!
//! The crate reports on itself through `tracing`: dropped records, reclaimed
//! pool slots and slot misuse. Applications that already install a
//! subscriber get those events for free; others can call [`init_diagnostics`].

use std::path::PathBuf;

use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{
    fmt::{self, time::UtcTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Default directive when neither the config nor `RUST_LOG` supplies one.
pub const DEFAULT_FILTER: &str = "staged_logger=warn";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticsOutput {
    Stderr,
    /// Daily-rolling file `directory/prefix.YYYY-MM-DD`.
    File { directory: PathBuf, prefix: String },
}

#[derive(Debug, Clone)]
pub struct DiagnosticsConfig {
    /// `EnvFilter` directives, e.g. `"staged_logger=debug"`.
    pub filter: String,
    pub output: DiagnosticsOutput,
    pub ansi: bool,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_FILTER.to_string(),
            output: DiagnosticsOutput::Stderr,
            ansi: false,
        }
    }
}

impl DiagnosticsConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    pub fn with_output(mut self, output: DiagnosticsOutput) -> Self {
        self.output = output;
        self
    }

    pub fn with_ansi(mut self, ansi: bool) -> Self {
        self.ansi = ansi;
        self
    }
}

/// Installs a global fmt subscriber for the crate's diagnostics.
///
/// `RUST_LOG` overrides the configured filter. Returns the writer guard,
/// which must be kept alive for buffered lines to be flushed, or `None` if a
/// global subscriber was already installed.
pub fn init_diagnostics(config: DiagnosticsConfig) -> Option<WorkerGuard> {
    let filter = build_filter(&config.filter);

    let (writer, guard) = match &config.output {
        DiagnosticsOutput::Stderr => tracing_appender::non_blocking(std::io::stderr()),
        DiagnosticsOutput::File { directory, prefix } => {
            tracing_appender::non_blocking(rolling::daily(directory, prefix))
        }
    };

    let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(config.ansi)
        .with_timer(UtcTime::rfc_3339())
        .with_target(true)
        .with_filter(filter);

    match tracing_subscriber::registry().with(layer).try_init() {
        Ok(()) => Some(guard),
        Err(_) => None,
    }
}

fn build_filter(directives: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives))
}
