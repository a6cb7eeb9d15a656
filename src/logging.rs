//! Logging backend
//!
//! Installs a `log` backend that writes to stderr. Stdout stays reserved for
//! prediction output.

use std::io::Write;

use chrono::Utc;
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

/// A logger that writes one line per record to stderr
pub struct StderrLogger {
    level: LevelFilter,
}

impl StderrLogger {
    pub const fn new(level: LevelFilter) -> Self {
        Self { level }
    }
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        eprintln!("{}", format_record(record));
    }

    fn flush(&self) {
        std::io::stderr().flush().ok();
    }
}

fn format_record(record: &Record) -> String {
    format!(
        "{} [{}] {} - {}",
        Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ"),
        record.level(),
        record.target(),
        record.args()
    )
}

/// Install the stderr logger as the global `log` backend
pub fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
    let logger = Box::new(StderrLogger::new(level));
    log::set_boxed_logger(logger)?;
    log::set_max_level(level);
    Ok(())
}
