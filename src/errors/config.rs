// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::errors::ProtocolError;
use thiserror::Error;

/// Errors raised while loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("failed to parse TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("unsupported config file extension '{0}' (expected yaml, yml or toml)")]
    UnsupportedFormat(String),

    #[error("config failed validation: {}", join_errors(.0))]
    Invalid(Vec<ValidationError>),

    #[error("cannot build runtime: {0}")]
    Runtime(#[from] ProtocolError),
}

/// A single semantic problem found in an otherwise well-formed configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{section}: worker count must be at least 1")]
    InvalidWorkerCount { section: &'static str },

    #[error("continuation_pool: queue capacity must be at least 1")]
    InvalidQueueCapacity,

    #[error("{section}: backoff multiplier must be >= 1.0, got {value}")]
    InvalidBackoffMultiplier { section: String, value: f64 },

    #[error("{section}: maximum delay {maximum_ms}ms is below initial delay {initial_ms}ms")]
    DelayOrdering {
        section: String,
        initial_ms: u64,
        maximum_ms: u64,
    },

    #[error("{section}: collision avoidance factor must be in (0, 1], got {value}")]
    InvalidCollisionAvoidanceFactor { section: String, value: f64 },

    #[error("invalid delay pattern '{pattern}': {reason}")]
    InvalidDelayPattern { pattern: String, reason: String },

    #[error("recovery: destination must not be empty")]
    EmptyRecoveryDestination,

    #[error("fan_out: unknown aggregation strategy '{0}'")]
    UnknownAggregation(String),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
