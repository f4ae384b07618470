// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Subscriber setup for the `tracing` events emitted by the message types.
//!
//! ## Environment Variables
//!
//! - `LOG_LEVEL`: ERROR, WARN, INFO, DEBUG or TRACE (defaults to INFO)
//! - `LOG_FORMAT`: `pretty` or `compact` (defaults to compact)
//! - `RUST_LOG`: overrides the level filter entirely

use std::env;
use tracing::Level;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Log output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line, human-readable output for development
    Pretty,
    /// Single-line output for terminals and log files
    Compact,
}

impl LogFormat {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "pretty" => LogFormat::Pretty,
            _ => LogFormat::Compact,
        }
    }
}

pub fn parse_level(s: &str) -> Level {
    match s.to_uppercase().as_str() {
        "ERROR" => Level::ERROR,
        "WARN" => Level::WARN,
        "DEBUG" => Level::DEBUG,
        "TRACE" => Level::TRACE,
        _ => Level::INFO,
    }
}

/// Install a global subscriber. Fails if one is already installed.
pub fn init_logging(level: Level, format: LogFormat) -> Result<(), TryInitError> {
    let filter = match env::var("RUST_LOG") {
        Ok(rust_log) => EnvFilter::new(rust_log),
        Err(_) => EnvFilter::new(level.to_string()),
    };

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Pretty => subscriber.with(fmt::layer().pretty()).try_init(),
        LogFormat::Compact => subscriber
            .with(fmt::layer().compact().with_target(false))
            .try_init(),
    }
}

/// Initialize logging from `LOG_LEVEL` and `LOG_FORMAT`.
pub fn init_default_logging() -> Result<(), TryInitError> {
    let level = env::var("LOG_LEVEL")
        .map(|value| parse_level(&value))
        .unwrap_or(Level::INFO);
    let format = env::var("LOG_FORMAT")
        .map(|value| LogFormat::parse(&value))
        .unwrap_or(LogFormat::Compact);

    init_logging(level, format)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level_defaults_to_info() {
        assert_eq!(parse_level("debug"), Level::DEBUG);
        assert_eq!(parse_level("WARN"), Level::WARN);
        assert_eq!(parse_level("verbose"), Level::INFO);
    }

    #[test]
    fn test_parse_format() {
        assert_eq!(LogFormat::parse("PRETTY"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("compact"), LogFormat::Compact);
        assert_eq!(LogFormat::parse("json"), LogFormat::Compact);
    }
}
