// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::config::consts::{
    DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_COLLISION_AVOIDANCE_FACTOR,
    DEFAULT_INITIAL_REDELIVERY_DELAY_MS, DEFAULT_MAXIMUM_REDELIVERIES,
    DEFAULT_MAXIMUM_REDELIVERY_DELAY_MS,
};
use crate::errors::ValidationError;
use crate::task::Task;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

pub type RetryWhile = Arc<dyn Fn(&Task) -> bool + Send + Sync>;

/// How often and how patiently a failed task is redelivered.
///
/// Built once with the consuming setters below and then shared behind an
/// `Arc`; it is never mutated while tasks are in flight.
///
/// ```
/// use switchyard::policy::RedeliveryPolicy;
/// use std::time::Duration;
///
/// let policy = RedeliveryPolicy::default()
///     .maximum_redeliveries(3)
///     .initial_delay(Duration::from_millis(100))
///     .backoff_multiplier(2.0);
///
/// assert_eq!(policy.delay_for(1), Duration::from_millis(100));
/// assert_eq!(policy.delay_for(3), Duration::from_millis(400));
/// ```
#[derive(Clone)]
pub struct RedeliveryPolicy {
    maximum_redeliveries: i32,
    initial_delay: Duration,
    backoff_multiplier: f64,
    maximum_delay: Duration,
    jitter: bool,
    collision_avoidance_factor: f64,
    delay_pattern: Option<DelayPattern>,
    retry_while: Option<RetryWhile>,
    allow_redelivery_while_stopping: bool,
    retry_attempted_log_interval: u32,
}

impl Default for RedeliveryPolicy {
    fn default() -> Self {
        Self {
            maximum_redeliveries: DEFAULT_MAXIMUM_REDELIVERIES,
            initial_delay: Duration::from_millis(DEFAULT_INITIAL_REDELIVERY_DELAY_MS),
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            maximum_delay: Duration::from_millis(DEFAULT_MAXIMUM_REDELIVERY_DELAY_MS),
            jitter: false,
            collision_avoidance_factor: DEFAULT_COLLISION_AVOIDANCE_FACTOR,
            delay_pattern: None,
            retry_while: None,
            allow_redelivery_while_stopping: true,
            retry_attempted_log_interval: 1,
        }
    }
}

impl RedeliveryPolicy {
    /// Negative means redeliver forever.
    pub fn maximum_redeliveries(mut self, maximum: i32) -> Self {
        self.maximum_redeliveries = maximum;
        self
    }

    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Cap applied after backoff and jitter. Zero disables the cap.
    pub fn maximum_delay(mut self, delay: Duration) -> Self {
        self.maximum_delay = delay;
        self
    }

    pub fn jitter(mut self, enabled: bool) -> Self {
        self.jitter = enabled;
        self
    }

    pub fn collision_avoidance_factor(mut self, factor: f64) -> Self {
        self.collision_avoidance_factor = factor;
        self
    }

    /// Replaces the exponential computation entirely.
    pub fn delay_pattern(mut self, pattern: DelayPattern) -> Self {
        self.delay_pattern = Some(pattern);
        self
    }

    pub fn retry_while<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Task) -> bool + Send + Sync + 'static,
    {
        self.retry_while = Some(Arc::new(predicate));
        self
    }

    pub fn allow_redelivery_while_stopping(mut self, allow: bool) -> Self {
        self.allow_redelivery_while_stopping = allow;
        self
    }

    pub fn retry_attempted_log_interval(mut self, interval: u32) -> Self {
        self.retry_attempted_log_interval = interval.max(1);
        self
    }

    pub fn maximum(&self) -> i32 {
        self.maximum_redeliveries
    }

    pub fn allows_redelivery_while_stopping(&self) -> bool {
        self.allow_redelivery_while_stopping
    }

    /// Whether redelivery number `redelivery` (1-based) should be logged.
    pub fn should_log_attempt(&self, redelivery: u32) -> bool {
        redelivery % self.retry_attempted_log_interval == 0
    }

    /// Whether the policy permits another redelivery after `performed` redeliveries.
    ///
    /// Both the ceiling and the retry-while predicate must agree.
    pub fn permits(&self, task: &Task, performed: u32) -> bool {
        let below_ceiling = self.maximum_redeliveries < 0
            || i64::from(performed) < i64::from(self.maximum_redeliveries);
        below_ceiling
            && self
                .retry_while
                .as_ref()
                .map_or(true, |predicate| predicate(task))
    }

    /// Delay before redelivery number `redelivery` (1-based).
    pub fn delay_for(&self, redelivery: u32) -> Duration {
        if let Some(pattern) = &self.delay_pattern {
            return pattern.delay_for(redelivery);
        }

        let exponent = i32::try_from(redelivery.saturating_sub(1)).unwrap_or(i32::MAX);
        let mut delay_ms =
            self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(exponent);

        if self.jitter && delay_ms > 0.0 {
            let spread = delay_ms * self.collision_avoidance_factor * fastrand::f64();
            delay_ms = if fastrand::bool() {
                delay_ms + spread
            } else {
                delay_ms - spread
            };
        }

        let cap_ms = self.maximum_delay.as_millis() as f64;
        if cap_ms > 0.0 && delay_ms > cap_ms {
            delay_ms = cap_ms;
        }

        Duration::from_millis(delay_ms.max(0.0).round() as u64)
    }
}

impl fmt::Debug for RedeliveryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedeliveryPolicy")
            .field("maximum_redeliveries", &self.maximum_redeliveries)
            .field("initial_delay", &self.initial_delay)
            .field("backoff_multiplier", &self.backoff_multiplier)
            .field("maximum_delay", &self.maximum_delay)
            .field("jitter", &self.jitter)
            .field("delay_pattern", &self.delay_pattern)
            .field("retry_while", &self.retry_while.is_some())
            .finish()
    }
}

/// Stepwise delays: `"0:100;3:1000"` waits 100ms for redeliveries 1 and 2
/// and 1s from redelivery 3 onwards.
#[derive(Debug, Clone, PartialEq)]
pub struct DelayPattern {
    steps: Vec<(u32, Duration)>,
}

impl DelayPattern {
    pub fn delay_for(&self, redelivery: u32) -> Duration {
        self.steps
            .iter()
            .take_while(|(from, _)| *from <= redelivery)
            .last()
            .map(|(_, delay)| *delay)
            .unwrap_or_default()
    }
}

impl FromStr for DelayPattern {
    type Err = ValidationError;

    fn from_str(pattern: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: String| ValidationError::InvalidDelayPattern {
            pattern: pattern.to_string(),
            reason,
        };

        let mut steps = Vec::new();
        for group in pattern.split(';').map(str::trim).filter(|g| !g.is_empty()) {
            let (from, delay) = group
                .split_once(':')
                .ok_or_else(|| invalid(format!("group '{}' is not <count>:<millis>", group)))?;
            let from: u32 = from
                .trim()
                .parse()
                .map_err(|_| invalid(format!("bad count in '{}'", group)))?;
            let delay: u64 = delay
                .trim()
                .parse()
                .map_err(|_| invalid(format!("bad delay in '{}'", group)))?;

            if let Some((previous, _)) = steps.last() {
                if from <= *previous {
                    return Err(invalid(format!(
                        "counts must increase, {} follows {}",
                        from, previous
                    )));
                }
            }
            steps.push((from, Duration::from_millis(delay)));
        }

        if steps.is_empty() {
            return Err(invalid("no groups".to_string()));
        }
        Ok(Self { steps })
    }
}
