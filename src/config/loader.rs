// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::config::consts::{
    DEFAULT_AGGREGATION, DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_COLLISION_AVOIDANCE_FACTOR,
    DEFAULT_CONTINUATION_QUEUE_CAPACITY, DEFAULT_INITIAL_REDELIVERY_DELAY_MS,
    DEFAULT_MAXIMUM_REDELIVERIES, DEFAULT_MAXIMUM_REDELIVERY_DELAY_MS,
    DEFAULT_MAX_IDLE_PER_DESTINATION, DEFAULT_SHUTDOWN_TIMEOUT_MS,
};
use crate::engine::RejectionPolicy;
use crate::errors::{ConfigError, FailureKind, ValidationError};
use crate::observability::messages::config::{ConfigLoaded, ConfigValidationFailed};
use crate::observability::messages::StructuredLog;
use crate::policy::{DelayPattern, HandlingIntent, RedeliveryPolicy};
use crate::task::TrackerMode;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Main configuration structure for a switchyard runtime.
///
/// Every section is optional and falls back to the defaults in
/// [`crate::config::consts`].
///
/// # Example
/// ```yaml
/// engine:
///   shutdown_timeout_ms: 5000
/// continuation_pool:
///   workers: 4
///   queue_capacity: 256
///   rejection: caller_runs
/// resource_pool:
///   max_idle_per_destination: 4
/// redelivery:
///   maximum_redeliveries: 3
///   initial_delay_ms: 100
///   backoff_multiplier: 2.0
/// exception_policies:
///   - on: [terminal]
///     intent: none
/// fan_out:
///   parallel: true
///   recipients: ["log:audit", "record:archive", "flaky:2"]
///   aggregation:
///     strategy: grouped_body
/// recovery:
///   destination: "record:dead-letter"
///   use_original_body: true
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SwitchyardConfig {
    pub engine: EngineConfig,
    pub continuation_pool: ContinuationPoolConfig,
    pub resource_pool: ResourcePoolConfig,
    pub redelivery: RedeliveryConfig,
    pub exception_policies: Vec<ExceptionPolicyConfig>,
    pub fan_out: FanOutConfig,
    pub recovery: RecoveryConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// How long shutdown waits for in-flight tasks.
    pub shutdown_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout_ms: DEFAULT_SHUTDOWN_TIMEOUT_MS,
        }
    }
}

impl EngineConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ContinuationPoolConfig {
    /// Defaults to the available parallelism.
    pub workers: Option<usize>,
    pub queue_capacity: usize,
    pub rejection: RejectionPolicy,
}

impl Default for ContinuationPoolConfig {
    fn default() -> Self {
        Self {
            workers: None,
            queue_capacity: DEFAULT_CONTINUATION_QUEUE_CAPACITY,
            rejection: RejectionPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResourcePoolConfig {
    pub max_idle_per_destination: usize,
}

impl Default for ResourcePoolConfig {
    fn default() -> Self {
        Self {
            max_idle_per_destination: DEFAULT_MAX_IDLE_PER_DESTINATION,
        }
    }
}

/// Redelivery settings. A negative `maximum_redeliveries` means unbounded.
///
/// `delay_pattern` (e.g. `"0:100;3:1000"`) replaces the exponential delay
/// when set.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedeliveryConfig {
    pub maximum_redeliveries: i32,
    pub initial_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub maximum_delay_ms: u64,
    pub jitter: bool,
    pub collision_avoidance_factor: f64,
    pub delay_pattern: Option<String>,
    pub allow_redelivery_while_stopping: bool,
    pub retry_attempted_log_interval: u32,
}

impl Default for RedeliveryConfig {
    fn default() -> Self {
        Self {
            maximum_redeliveries: DEFAULT_MAXIMUM_REDELIVERIES,
            initial_delay_ms: DEFAULT_INITIAL_REDELIVERY_DELAY_MS,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            maximum_delay_ms: DEFAULT_MAXIMUM_REDELIVERY_DELAY_MS,
            jitter: false,
            collision_avoidance_factor: DEFAULT_COLLISION_AVOIDANCE_FACTOR,
            delay_pattern: None,
            allow_redelivery_while_stopping: true,
            retry_attempted_log_interval: 1,
        }
    }
}

impl RedeliveryConfig {
    /// Build the immutable policy. Fails only on an unparseable delay
    /// pattern; range checks live in validation.
    pub fn to_policy(&self) -> Result<RedeliveryPolicy, ValidationError> {
        let mut policy = RedeliveryPolicy::default()
            .maximum_redeliveries(self.maximum_redeliveries)
            .initial_delay(Duration::from_millis(self.initial_delay_ms))
            .backoff_multiplier(self.backoff_multiplier)
            .maximum_delay(Duration::from_millis(self.maximum_delay_ms))
            .jitter(self.jitter)
            .collision_avoidance_factor(self.collision_avoidance_factor)
            .allow_redelivery_while_stopping(self.allow_redelivery_while_stopping)
            .retry_attempted_log_interval(self.retry_attempted_log_interval);

        if let Some(pattern) = &self.delay_pattern {
            policy = policy.delay_pattern(pattern.parse::<DelayPattern>()?);
        }
        Ok(policy)
    }
}

/// One row of the exception policy table.
///
/// An empty `on` list matches every failure.
///
/// # Example
/// ```yaml
/// - on: [transient, timeout]
///   intent: retry
///   redelivery:
///     maximum_redeliveries: 5
///     initial_delay_ms: 50
/// - on: [terminal]
///   intent: handled
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExceptionPolicyConfig {
    #[serde(default)]
    pub on: Vec<FailureKind>,
    #[serde(default)]
    pub intent: HandlingIntent,
    /// Overrides the top-level redelivery section for failures this row matches.
    #[serde(default)]
    pub redelivery: Option<RedeliveryConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FanOutConfig {
    pub parallel: bool,
    /// Defaults to the available parallelism.
    pub workers: Option<usize>,
    pub streaming: bool,
    pub stop_on_exception: bool,
    pub ignore_invalid: bool,
    pub timeout_ms: Option<u64>,
    pub tracker_mode: TrackerMode,
    /// Recipient identifiers for a static fan-out.
    pub recipients: Vec<String>,
    pub aggregation: AggregationConfig,
}

impl Default for FanOutConfig {
    fn default() -> Self {
        Self {
            parallel: false,
            workers: None,
            streaming: false,
            stop_on_exception: false,
            ignore_invalid: false,
            timeout_ms: None,
            tracker_mode: TrackerMode::default(),
            recipients: Vec::new(),
            aggregation: AggregationConfig::default(),
        }
    }
}

/// Which aggregation strategy a fan-out uses, and its options.
///
/// `separator` applies to `concatenate`; `merge_arrays` and
/// `conflict_resolution` apply to `json_merge`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    pub strategy: String,
    pub separator: String,
    pub merge_arrays: bool,
    pub conflict_resolution: ConflictResolution,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            strategy: DEFAULT_AGGREGATION.to_string(),
            separator: String::new(),
            merge_arrays: false,
            conflict_resolution: ConflictResolution::default(),
        }
    }
}

/// What `json_merge` does when two children set the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolution {
    TakeFirst,
    #[default]
    TakeLast,
    /// Merge nested objects (and arrays, when enabled); otherwise take last.
    Merge,
    /// Fail the aggregation.
    Error,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Destination key exhausted tasks are sent to.
    pub destination: Option<String>,
    pub use_original_body: bool,
    /// Mark the task handled even when the recovery send fails.
    pub handle_recovery_failure: bool,
}

fn format_of(path: &Path) -> Result<&'static str, ConfigError> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => Ok("yaml"),
        Some("toml") => Ok("toml"),
        other => Err(ConfigError::UnsupportedFormat(
            other.unwrap_or_default().to_string(),
        )),
    }
}

/// Load a config from a YAML or TOML file, chosen by extension.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<SwitchyardConfig, ConfigError> {
    let path = path.as_ref();
    let format = format_of(path)?;
    let content = fs::read_to_string(path)?;
    let cfg: SwitchyardConfig = match format {
        "toml" => toml::from_str(&content)?,
        _ => serde_yaml::from_str(&content)?,
    };

    ConfigLoaded {
        path: &path.display().to_string(),
        format,
    }
    .log();
    Ok(cfg)
}

/// Load a config and run every semantic check on it.
pub fn load_and_validate_config<P: AsRef<Path>>(path: P) -> Result<SwitchyardConfig, ConfigError> {
    let cfg = load_config(path)?;

    if let Err(errors) = crate::config::validate_config(&cfg) {
        let joined = errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        ConfigValidationFailed {
            error_count: errors.len(),
            errors: &joined,
        }
        .log();
        return Err(ConfigError::Invalid(errors));
    }

    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_empty_config_uses_defaults() {
        let cfg: SwitchyardConfig = serde_yaml::from_str("{}").unwrap();

        assert_eq!(cfg.engine.shutdown_timeout_ms, DEFAULT_SHUTDOWN_TIMEOUT_MS);
        assert_eq!(cfg.continuation_pool.workers, None);
        assert_eq!(cfg.continuation_pool.rejection, RejectionPolicy::CallerRuns);
        assert_eq!(cfg.redelivery.maximum_redeliveries, 0);
        assert_eq!(cfg.redelivery.maximum_delay_ms, 60_000);
        assert_eq!(cfg.fan_out.aggregation.strategy, "use_latest");
        assert!(cfg.exception_policies.is_empty());
        assert!(cfg.recovery.destination.is_none());
    }

    #[test]
    fn parse_full_config() {
        let yaml = r#"
continuation_pool:
  workers: 2
  queue_capacity: 16
  rejection: abort
redelivery:
  maximum_redeliveries: -1
  initial_delay_ms: 10
  backoff_multiplier: 2.0
  delay_pattern: "0:10;2:50"
exception_policies:
  - on: [transient, timeout]
    intent: retry
    redelivery:
      maximum_redeliveries: 5
  - on: [terminal]
    intent: handled
  - intent: none
fan_out:
  parallel: true
  workers: 3
  timeout_ms: 250
  tracker_mode: isolated
  recipients: ["log:a", "record:b"]
  aggregation:
    strategy: json_merge
    merge_arrays: true
    conflict_resolution: take_first
recovery:
  destination: "record:dlq"
  use_original_body: true
"#;

        let cfg: SwitchyardConfig = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(cfg.continuation_pool.workers, Some(2));
        assert_eq!(cfg.continuation_pool.rejection, RejectionPolicy::Abort);
        assert_eq!(cfg.redelivery.maximum_redeliveries, -1);
        assert_eq!(cfg.exception_policies.len(), 3);
        assert_eq!(
            cfg.exception_policies[0].on,
            vec![FailureKind::Transient, FailureKind::Timeout]
        );
        assert_eq!(
            cfg.exception_policies[0]
                .redelivery
                .as_ref()
                .map(|r| r.maximum_redeliveries),
            Some(5)
        );
        assert_eq!(cfg.exception_policies[1].intent, HandlingIntent::Handled);
        assert!(cfg.exception_policies[2].on.is_empty());
        assert_eq!(cfg.fan_out.tracker_mode, TrackerMode::Isolated);
        assert_eq!(cfg.fan_out.recipients, vec!["log:a", "record:b"]);
        assert_eq!(
            cfg.fan_out.aggregation.conflict_resolution,
            ConflictResolution::TakeFirst
        );
        assert_eq!(cfg.recovery.destination.as_deref(), Some("record:dlq"));
    }

    #[test]
    fn test_redelivery_config_to_policy() {
        let cfg = RedeliveryConfig {
            maximum_redeliveries: 3,
            initial_delay_ms: 100,
            backoff_multiplier: 2.0,
            ..RedeliveryConfig::default()
        };
        let policy = cfg.to_policy().unwrap();
        assert_eq!(policy.maximum(), 3);
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));

        let patterned = RedeliveryConfig {
            delay_pattern: Some("0:5;2:50".to_string()),
            ..cfg.clone()
        };
        assert_eq!(
            patterned.to_policy().unwrap().delay_for(2),
            Duration::from_millis(50)
        );

        let broken = RedeliveryConfig {
            delay_pattern: Some("soon".to_string()),
            ..cfg
        };
        assert!(matches!(
            broken.to_policy(),
            Err(ValidationError::InvalidDelayPattern { .. })
        ));
    }

    #[test]
    fn test_unsupported_extension_is_rejected() {
        let result = load_config("switchyard.json");
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(ext)) if ext == "json"));
    }
}
