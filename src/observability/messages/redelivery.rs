// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for redelivery and recovery.
//!
//! This module contains message types for logging events related to:
//! * Redelivery scheduling and state transitions
//! * Failures absorbed by an exception policy
//! * Exhaustion and hand-off to a recovery destination

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// A failed task will be redelivered after a delay.
///
/// # Log Level
/// `debug!` - Expected during transient outages
///
/// # Example
/// ```
/// use switchyard::observability::messages::redelivery::RedeliveryScheduled;
/// use std::time::Duration;
///
/// let msg = RedeliveryScheduled {
///     stage: "orders",
///     task_id: "6f1c",
///     redelivery: 2,
///     maximum: 5,
///     delay: Duration::from_millis(200),
/// };
///
/// tracing::debug!("{}", msg);
/// ```
pub struct RedeliveryScheduled<'a> {
    pub stage: &'a str,
    pub task_id: &'a str,
    pub redelivery: u32,
    pub maximum: i32,
    pub delay: std::time::Duration,
}

impl Display for RedeliveryScheduled<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Redelivery {}/{} of task {} through '{}' in {:?}",
            self.redelivery, self.maximum, self.task_id, self.stage, self.delay
        )
    }
}

impl StructuredLog for RedeliveryScheduled<'_> {
    fn log(&self) {
        tracing::debug!(
            stage = self.stage,
            task_id = self.task_id,
            redelivery = self.redelivery,
            maximum = self.maximum,
            delay_ms = self.delay.as_millis() as u64,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "redelivery",
            span_name = name,
            stage = self.stage,
            task_id = self.task_id,
            redelivery = self.redelivery,
        )
    }
}

/// The redelivery state machine moved to a new state.
///
/// # Log Level
/// `trace!` - Fine grained diagnostics
pub struct RedeliveryTransition<'a> {
    pub stage: &'a str,
    pub task_id: &'a str,
    pub from: &'a str,
    pub to: &'a str,
}

impl Display for RedeliveryTransition<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Redelivery '{}' task {}: {} -> {}",
            self.stage, self.task_id, self.from, self.to
        )
    }
}

impl StructuredLog for RedeliveryTransition<'_> {
    fn log(&self) {
        tracing::trace!(
            stage = self.stage,
            task_id = self.task_id,
            from = self.from,
            to = self.to,
            "{}", self
        );
    }
}

/// An exception policy absorbed a failure.
///
/// # Log Level
/// `debug!`
pub struct FailureAbsorbed<'a> {
    pub stage: &'a str,
    pub task_id: &'a str,
    pub intent: &'a str,
    pub failure: &'a str,
}

impl Display for FailureAbsorbed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Task {} failure {} in '{}': {}",
            self.task_id, self.intent, self.stage, self.failure
        )
    }
}

impl StructuredLog for FailureAbsorbed<'_> {
    fn log(&self) {
        tracing::debug!(
            stage = self.stage,
            task_id = self.task_id,
            intent = self.intent,
            failure = self.failure,
            "{}", self
        );
    }
}

/// A rollback-only task bypassed redelivery and recovery.
///
/// # Log Level
/// `debug!`
pub struct RollbackShortCircuit<'a> {
    pub stage: &'a str,
    pub task_id: &'a str,
}

impl Display for RollbackShortCircuit<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Task {} is rollback-only; '{}' will neither redeliver nor recover it",
            self.task_id, self.stage
        )
    }
}

impl StructuredLog for RollbackShortCircuit<'_> {
    fn log(&self) {
        tracing::debug!(stage = self.stage, task_id = self.task_id, "{}", self);
    }
}

/// No further redeliveries will be attempted.
///
/// # Log Level
/// `warn!` - The task is recovered or fails permanently
pub struct RedeliveryExhausted<'a> {
    pub stage: &'a str,
    pub task_id: &'a str,
    pub attempts: u32,
    pub failure: &'a str,
}

impl Display for RedeliveryExhausted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Redelivery '{}' exhausted for task {} after {} attempts: {}",
            self.stage, self.task_id, self.attempts, self.failure
        )
    }
}

impl StructuredLog for RedeliveryExhausted<'_> {
    fn log(&self) {
        tracing::warn!(
            stage = self.stage,
            task_id = self.task_id,
            attempts = self.attempts,
            failure = self.failure,
            "{}", self
        );
    }
}

/// An exhausted task was accepted by the recovery destination.
///
/// # Log Level
/// `info!` - Important operational event
pub struct TaskRecovered<'a> {
    pub stage: &'a str,
    pub task_id: &'a str,
    pub destination: &'a str,
}

impl Display for TaskRecovered<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Task {} handed to recovery destination '{}' by '{}'",
            self.task_id, self.destination, self.stage
        )
    }
}

impl StructuredLog for TaskRecovered<'_> {
    fn log(&self) {
        tracing::info!(
            stage = self.stage,
            task_id = self.task_id,
            destination = self.destination,
            "{}", self
        );
    }
}

/// The recovery destination itself failed.
///
/// # Log Level
/// `error!` - The task could not be parked anywhere
pub struct RecoveryHandoffFailed<'a> {
    pub stage: &'a str,
    pub task_id: &'a str,
    pub destination: &'a str,
    pub error: &'a str,
}

impl Display for RecoveryHandoffFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Recovery destination '{}' failed for task {} in '{}': {}",
            self.destination, self.task_id, self.stage, self.error
        )
    }
}

impl StructuredLog for RecoveryHandoffFailed<'_> {
    fn log(&self) {
        tracing::error!(
            stage = self.stage,
            task_id = self.task_id,
            destination = self.destination,
            error = self.error,
            "{}", self
        );
    }
}

/// A scheduled redelivery fired after the engine was torn down.
///
/// # Log Level
/// `warn!`
pub struct RedeliveryRejected<'a> {
    pub stage: &'a str,
    pub task_id: &'a str,
}

impl Display for RedeliveryRejected<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Redelivery of task {} through '{}' rejected: engine stopped",
            self.task_id, self.stage
        )
    }
}

impl StructuredLog for RedeliveryRejected<'_> {
    fn log(&self) {
        tracing::warn!(stage = self.stage, task_id = self.task_id, "{}", self);
    }
}
