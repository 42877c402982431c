//! Console logger for the harness.
//!
//! Engine records are printed only with `--verbose`; warnings are always
//! counted so scenarios can assert on them.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use log::{Level, LevelFilter, Log, Metadata, Record};

pub struct SimLogger {
    verbose: AtomicBool,
    warnings: AtomicUsize,
}

static LOGGER: SimLogger = SimLogger {
    verbose: AtomicBool::new(false),
    warnings: AtomicUsize::new(0),
};

/// Install the logger. Safe to call more than once.
pub fn init(verbose: bool) {
    LOGGER.verbose.store(verbose, Ordering::Relaxed);
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(LevelFilter::Debug);
    }
}

/// Warnings logged so far.
pub fn warnings() -> usize {
    LOGGER.warnings.load(Ordering::Relaxed)
}

impl Log for SimLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Debug
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        if record.level() == Level::Warn {
            self.warnings.fetch_add(1, Ordering::Relaxed);
        }
        if self.verbose.load(Ordering::Relaxed) && record.level() <= Level::Info {
            eprintln!("    [{:<5}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}
