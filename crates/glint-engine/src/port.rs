//! Host port: the handful of operations the engine cannot perform
//! itself (wall-clock time, the local time zone, structured logging,
//! and fatal termination) and must delegate to the embedder.
//!
//! The default [`StdPort`] answers time queries from
//! [`std::time::SystemTime`] and routes logging through `tracing`,
//! matching the rest of this crate's ambient stack; an embedder with
//! its own clock or log sink supplies a different [`HostPort`].

use std::time::{SystemTime, UNIX_EPOCH};

/// Severity of a `port_log` call, ordered least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// The operations an embedding must provide that the engine cannot
/// perform on its own.
pub trait HostPort {
    /// Milliseconds since the Unix epoch, per `Date.now()`'s contract.
    fn current_time_ms(&self) -> f64;

    /// The host's IANA time zone name (e.g. `"UTC"`), used by the `Date`
    /// built-in's local-time conversions.
    fn time_zone(&self) -> String;

    /// Emit a structured log line at the given level.
    fn log(&self, level: LogLevel, message: &str);

    /// Terminate the process after an unrecoverable engine condition.
    /// Implementations must not return: the caller's invariant is that
    /// no further script runs once this is called.
    fn fatal(&self, code: i32) -> ! {
        self.log(LogLevel::Error, &format!("fatal engine error, exit code {code}"));
        std::process::exit(code);
    }
}

/// The default host port: system clock, UTC, `tracing`-backed logging.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdPort;

impl HostPort for StdPort {
    fn current_time_ms(&self) -> f64 {
        SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as f64).unwrap_or(0.0)
    }

    fn time_zone(&self) -> String {
        "UTC".to_string()
    }

    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Trace => tracing::trace!("{message}"),
            LogLevel::Debug => tracing::debug!("{message}"),
            LogLevel::Info => tracing::info!("{message}"),
            LogLevel::Warn => tracing::warn!("{message}"),
            LogLevel::Error => tracing::error!("{message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn std_port_reports_a_plausible_unix_timestamp() {
        let port = StdPort;
        assert!(port.current_time_ms() > 1_700_000_000_000.0);
    }
}
