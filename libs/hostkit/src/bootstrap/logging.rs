//! Structured log output for the host process.
//!
//! The host core emits `tracing` events at every phase boundary and every
//! per-loader/per-component call; this module wires a default subscriber for
//! processes that do not install their own. `RUST_LOG` wins over the boot
//! configuration's log level when set.

use tracing_subscriber::EnvFilter;

use crate::config::LogLevel;

/// Default filter directive for a boot log level.
#[must_use]
pub fn default_directive(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Debug => "trace",
        LogLevel::Verbose => "debug",
        LogLevel::Info => "info",
        LogLevel::Warning => "warn",
        LogLevel::Error | LogLevel::Critical => "error",
    }
}

/// Install the process-wide subscriber. Safe to call more than once; later
/// calls are no-ops (the first subscriber stays installed).
pub fn init(level: LogLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(level)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directive_tracks_log_level() {
        assert_eq!(default_directive(LogLevel::Debug), "trace");
        assert_eq!(default_directive(LogLevel::Verbose), "debug");
        assert_eq!(default_directive(LogLevel::Info), "info");
        assert_eq!(default_directive(LogLevel::Warning), "warn");
        assert_eq!(default_directive(LogLevel::Error), "error");
        assert_eq!(default_directive(LogLevel::Critical), "error");
    }
}
