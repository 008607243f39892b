//! Plain stdout logging backend behind the `log` facade.

use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError};

/// Maps the 0..=9 CLI verbosity onto a level filter.
pub fn level_filter(verbosity: u8) -> LevelFilter {
    match verbosity.min(9) {
        0 => LevelFilter::Error,
        1 => LevelFilter::Warn,
        2 => LevelFilter::Info,
        3..=5 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

pub struct StdoutLogger {
    filter: LevelFilter,
}

impl StdoutLogger {
    pub fn new(verbosity: u8) -> Self {
        Self {
            filter: level_filter(verbosity),
        }
    }

    /// Installs the logger process-wide.
    pub fn init(verbosity: u8) -> Result<(), SetLoggerError> {
        let logger = StdoutLogger::new(verbosity);
        log::set_max_level(logger.filter);
        log::set_boxed_logger(Box::new(logger))
    }
}

impl Log for StdoutLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.filter
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let tag = match record.level() {
            Level::Error => "ERROR",
            Level::Warn => "WARN",
            Level::Info => "INFO",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
        };
        println!("[{}] {}", tag, record.args());
    }

    fn flush(&self) {}
}
