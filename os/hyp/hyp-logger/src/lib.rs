//! # Hypervisor Logger
//!
//! A [`log::Log`] backend for EL2 that formats each record as
//! `"[LEVEL] target: message\n"` straight into a [`core::fmt::Write`] sink,
//! typically the debug UART. There is no buffering and no allocation; the
//! sink sits behind a [`SpinLock`] so lines from different CPUs never
//! interleave.
//!
//! ```
//! use hyp_logger::SinkLogger;
//! use log::LevelFilter;
//!
//! static LOGGER: SinkLogger<String> = SinkLogger::new(LevelFilter::Info, String::new());
//!
//! LOGGER.init().unwrap();
//! log::info!(target: "boot", "pools ready");
//! log::debug!("filtered out");
//! assert_eq!(LOGGER.with_sink(|s| s.clone()), "[INFO] boot: pools ready\n");
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

use core::fmt::{self, Write};
use hyp_sync::SpinLock;
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

pub struct SinkLogger<W> {
    max_level: LevelFilter,
    sink: SpinLock<W>,
}

impl<W: Write + Send> SinkLogger<W> {
    #[must_use]
    pub const fn new(max_level: LevelFilter, sink: W) -> Self {
        Self {
            max_level,
            sink: SpinLock::new(sink),
        }
    }

    #[must_use]
    pub const fn max_level(&self) -> LevelFilter {
        self.max_level
    }

    /// Install as the global logger. Call once during early init.
    ///
    /// # Errors
    /// If another logger is already installed.
    pub fn init(&'static self) -> Result<(), SetLoggerError>
    where
        W: 'static,
    {
        log::set_logger(self)?;
        log::set_max_level(self.max_level);
        Ok(())
    }

    /// Run `f` on the sink under the lock.
    pub fn with_sink<R>(&self, f: impl FnOnce(&mut W) -> R) -> R {
        self.sink.with_lock(f)
    }

    fn write_record(sink: &mut W, record: &Record<'_>) -> fmt::Result {
        writeln!(sink, "[{}] {}: {}", record.level(), record.target(), record.args())
    }
}

impl<W: Write + Send> Log for SinkLogger<W> {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        // A failing sink has nowhere to report to.
        let _ = self.with_sink(|sink| Self::write_record(sink, record));
    }

    fn flush(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::Level;

    fn emit(logger: &SinkLogger<String>, level: Level, target: &str, msg: fmt::Arguments<'_>) {
        logger.log(&Record::builder().level(level).target(target).args(msg).build());
    }

    #[test]
    fn formats_level_target_and_message() {
        let logger = SinkLogger::new(LevelFilter::Trace, String::new());
        emit(&logger, Level::Warn, "hyp_page_alloc::pool", format_args!("pool#{} low", 1));
        emit(&logger, Level::Trace, "walker", format_args!("L3"));
        assert_eq!(
            logger.with_sink(|s| s.clone()),
            "[WARN] hyp_page_alloc::pool: pool#1 low\n[TRACE] walker: L3\n"
        );
    }

    #[test]
    fn drops_records_above_max_level() {
        let logger = SinkLogger::new(LevelFilter::Warn, String::new());
        emit(&logger, Level::Info, "t", format_args!("quiet"));
        emit(&logger, Level::Error, "t", format_args!("loud"));
        assert_eq!(logger.with_sink(|s| s.clone()), "[ERROR] t: loud\n");
        assert!(!logger.enabled(&Metadata::builder().level(Level::Debug).build()));
    }

    #[test]
    fn off_logs_nothing() {
        let logger = SinkLogger::new(LevelFilter::Off, String::new());
        emit(&logger, Level::Error, "t", format_args!("x"));
        assert!(logger.with_sink(|s| s.is_empty()));
    }
}
