//! Structured logging facade used by every component in the zone server.
//!
//! Every module takes a `Logger` at construction time and derives a child
//! logger carrying its own component tag, following the same
//! `log.new(o!("component" => ...))` convention the corpus uses throughout.

pub use slog::{debug, error, info, o, trace, warn, Logger};

use serdeconv;
use sloggers::terminal::{Destination, TerminalLoggerBuilder};
use sloggers::types::Severity;
use sloggers::Build;

/// Logging configuration, loaded as part of the process-wide `zone.toml`.
#[derive(serde::Serialize, serde::Deserialize, Clone)]
pub struct LogConfig {
    pub level: String,
    pub destination: LogDestination,
}

#[derive(serde::Serialize, serde::Deserialize, Clone, Copy, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogDestination {
    Stdout,
    Stderr,
}

impl Default for LogConfig {
    fn default() -> LogConfig {
        LogConfig {
            level: "info".to_string(),
            destination: LogDestination::Stderr,
        }
    }
}

/// Builds the root logger for the process from a `LogConfig`.
pub fn init(config: &LogConfig) -> Logger {
    let severity = match config.level.to_lowercase().as_str() {
        "trace" => Severity::Trace,
        "debug" => Severity::Debug,
        "warn" | "warning" => Severity::Warning,
        "error" => Severity::Error,
        "critical" => Severity::Critical,
        _ => Severity::Info,
    };

    let mut builder = TerminalLoggerBuilder::new();
    builder.level(severity);
    builder.destination(match config.destination {
        LogDestination::Stdout => Destination::Stdout,
        LogDestination::Stderr => Destination::Stderr,
    });

    builder.build().expect("failed to build root logger")
}

/// Parses a `LogConfig` out of a TOML fragment; used by callers that keep
/// logging settings alongside their own section rather than at the
/// top level of `zone.toml`.
pub fn from_toml_str(raw: &str) -> LogConfig {
    serdeconv::from_toml_str(raw).expect("invalid logging configuration")
}
