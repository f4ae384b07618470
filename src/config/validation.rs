// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Semantic validation for a parsed [`SwitchyardConfig`].
//!
//! Parsing only proves the file is well formed. Validation checks that the
//! values make sense together and collects *every* problem instead of
//! stopping at the first, so a broken config can be fixed in one pass.
//!
//! # Checks
//!
//! 1. **Pools**: worker counts and queue capacity are at least 1
//! 2. **Redelivery**: for the top-level section and every per-policy
//!    override, the backoff multiplier is >= 1.0, the maximum delay is not
//!    below the initial delay, the collision avoidance factor is in (0, 1]
//!    and the delay pattern (if any) parses
//! 3. **Fan-out**: the aggregation strategy is a known name
//! 4. **Recovery**: a configured destination key is not blank

use crate::backends::local::aggregators;
use crate::config::{RedeliveryConfig, SwitchyardConfig};
use crate::errors::ValidationError;
use crate::policy::DelayPattern;

/// Validate a configuration, returning all problems found.
///
/// # Examples
///
/// ```rust
/// use switchyard::config::{validate_config, SwitchyardConfig};
///
/// let config = SwitchyardConfig::default();
/// assert!(validate_config(&config).is_ok());
/// ```
pub fn validate_config(config: &SwitchyardConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.continuation_pool.workers == Some(0) {
        errors.push(ValidationError::InvalidWorkerCount {
            section: "continuation_pool",
        });
    }
    if config.continuation_pool.queue_capacity == 0 {
        errors.push(ValidationError::InvalidQueueCapacity);
    }
    if config.fan_out.workers == Some(0) {
        errors.push(ValidationError::InvalidWorkerCount { section: "fan_out" });
    }

    validate_redelivery("redelivery", &config.redelivery, &mut errors);
    for (index, policy) in config.exception_policies.iter().enumerate() {
        if let Some(redelivery) = &policy.redelivery {
            let section = format!("exception_policies[{}].redelivery", index);
            validate_redelivery(&section, redelivery, &mut errors);
        }
    }

    if let Err(e) = aggregators::from_config(&config.fan_out.aggregation) {
        errors.push(e);
    }

    if let Some(destination) = &config.recovery.destination {
        if destination.trim().is_empty() {
            errors.push(ValidationError::EmptyRecoveryDestination);
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_redelivery(section: &str, config: &RedeliveryConfig, errors: &mut Vec<ValidationError>) {
    if !(config.backoff_multiplier >= 1.0) {
        errors.push(ValidationError::InvalidBackoffMultiplier {
            section: section.to_string(),
            value: config.backoff_multiplier,
        });
    }

    if config.maximum_delay_ms < config.initial_delay_ms {
        errors.push(ValidationError::DelayOrdering {
            section: section.to_string(),
            initial_ms: config.initial_delay_ms,
            maximum_ms: config.maximum_delay_ms,
        });
    }

    let factor = config.collision_avoidance_factor;
    if !(factor > 0.0 && factor <= 1.0) {
        errors.push(ValidationError::InvalidCollisionAvoidanceFactor {
            section: section.to_string(),
            value: factor,
        });
    }

    if let Some(pattern) = &config.delay_pattern {
        if let Err(e) = pattern.parse::<DelayPattern>() {
            errors.push(e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExceptionPolicyConfig;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&SwitchyardConfig::default()).is_ok());
    }

    #[test]
    fn test_all_errors_are_collected() {
        let mut config = SwitchyardConfig::default();
        config.continuation_pool.workers = Some(0);
        config.continuation_pool.queue_capacity = 0;
        config.fan_out.workers = Some(0);
        config.redelivery.backoff_multiplier = 0.5;
        config.fan_out.aggregation.strategy = "majority_vote".to_string();
        config.recovery.destination = Some("  ".to_string());

        let errors = validate_config(&config).unwrap_err();

        assert_eq!(errors.len(), 6);
        assert!(errors.contains(&ValidationError::InvalidWorkerCount {
            section: "continuation_pool"
        }));
        assert!(errors.contains(&ValidationError::InvalidWorkerCount { section: "fan_out" }));
        assert!(errors.contains(&ValidationError::InvalidQueueCapacity));
        assert!(errors.contains(&ValidationError::UnknownAggregation(
            "majority_vote".to_string()
        )));
        assert!(errors.contains(&ValidationError::EmptyRecoveryDestination));
    }

    #[test]
    fn test_redelivery_ranges() {
        let test_cases = vec![
            (
                RedeliveryConfig {
                    initial_delay_ms: 5_000,
                    maximum_delay_ms: 1_000,
                    ..RedeliveryConfig::default()
                },
                "maximum delay 1000ms is below initial delay 5000ms",
            ),
            (
                RedeliveryConfig {
                    collision_avoidance_factor: 0.0,
                    ..RedeliveryConfig::default()
                },
                "collision avoidance factor",
            ),
            (
                RedeliveryConfig {
                    collision_avoidance_factor: 1.5,
                    ..RedeliveryConfig::default()
                },
                "collision avoidance factor",
            ),
            (
                RedeliveryConfig {
                    backoff_multiplier: f64::NAN,
                    ..RedeliveryConfig::default()
                },
                "backoff multiplier",
            ),
            (
                RedeliveryConfig {
                    delay_pattern: Some("3:100;1:10".to_string()),
                    ..RedeliveryConfig::default()
                },
                "counts must increase",
            ),
        ];

        for (redelivery, expected) in test_cases {
            let config = SwitchyardConfig {
                redelivery,
                ..SwitchyardConfig::default()
            };
            let errors = validate_config(&config).unwrap_err();
            assert_eq!(errors.len(), 1, "Expected one error for: {}", expected);
            assert!(
                errors[0].to_string().contains(expected),
                "'{}' does not mention '{}'",
                errors[0],
                expected
            );
        }
    }

    #[test]
    fn test_policy_overrides_are_validated_with_their_section() {
        let config = SwitchyardConfig {
            exception_policies: vec![
                ExceptionPolicyConfig::default(),
                ExceptionPolicyConfig {
                    redelivery: Some(RedeliveryConfig {
                        backoff_multiplier: 0.0,
                        ..RedeliveryConfig::default()
                    }),
                    ..ExceptionPolicyConfig::default()
                },
            ],
            ..SwitchyardConfig::default()
        };

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::InvalidBackoffMultiplier {
                section: "exception_policies[1].redelivery".to_string(),
                value: 0.0,
            }]
        );
    }
}
