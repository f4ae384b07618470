// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for fan-out dispatch and aggregation.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// A fan-out began dispatching copies of a task.
///
/// # Log Level
/// `debug!` - Per-task event
pub struct FanOutStarted<'a> {
    pub stage: &'a str,
    pub task_id: &'a str,
    pub parallel: bool,
    pub streaming: bool,
}

impl Display for FanOutStarted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Fan-out '{}' started for task {} (parallel={}, streaming={})",
            self.stage, self.task_id, self.parallel, self.streaming
        )
    }
}

impl StructuredLog for FanOutStarted<'_> {
    fn log(&self) {
        tracing::debug!(
            stage = self.stage,
            task_id = self.task_id,
            parallel = self.parallel,
            streaming = self.streaming,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "fan_out",
            span_name = name,
            stage = self.stage,
            task_id = self.task_id,
        )
    }
}

/// An unresolvable recipient was skipped.
///
/// # Log Level
/// `warn!` - Configured to be tolerated, but worth seeing
pub struct RecipientSkipped<'a> {
    pub stage: &'a str,
    pub recipient: &'a str,
    pub reason: &'a str,
}

impl Display for RecipientSkipped<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Fan-out '{}' skipped recipient '{}': {}",
            self.stage, self.recipient, self.reason
        )
    }
}

impl StructuredLog for RecipientSkipped<'_> {
    fn log(&self) {
        tracing::warn!(
            stage = self.stage,
            recipient = self.recipient,
            reason = self.reason,
            "{}", self
        );
    }
}

/// A child finished after the fan-out already completed; its result is discarded.
///
/// # Log Level
/// `debug!`
pub struct ChildAbandoned<'a> {
    pub stage: &'a str,
    pub index: usize,
}

impl Display for ChildAbandoned<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Fan-out '{}' discarded late child #{}",
            self.stage, self.index
        )
    }
}

impl StructuredLog for ChildAbandoned<'_> {
    fn log(&self) {
        tracing::debug!(stage = self.stage, index = self.index, "{}", self);
    }
}

/// The aggregation strategy rejected a child result.
///
/// # Log Level
/// `warn!` - The fan-out fails with this error
pub struct AggregationFailed<'a> {
    pub stage: &'a str,
    pub index: usize,
    pub error: &'a str,
}

impl Display for AggregationFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Fan-out '{}' failed to aggregate child #{}: {}",
            self.stage, self.index, self.error
        )
    }
}

impl StructuredLog for AggregationFailed<'_> {
    fn log(&self) {
        tracing::warn!(
            stage = self.stage,
            index = self.index,
            error = self.error,
            "{}", self
        );
    }
}

/// The fan-out deadline passed before all children completed.
///
/// # Log Level
/// `warn!` - Remaining children are abandoned
pub struct FanOutTimedOut<'a> {
    pub stage: &'a str,
    pub task_id: &'a str,
    pub timeout: std::time::Duration,
    pub in_flight: usize,
}

impl Display for FanOutTimedOut<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Fan-out '{}' timed out after {:?} for task {} with {} children in flight",
            self.stage, self.timeout, self.task_id, self.in_flight
        )
    }
}

impl StructuredLog for FanOutTimedOut<'_> {
    fn log(&self) {
        tracing::warn!(
            stage = self.stage,
            task_id = self.task_id,
            timeout_ms = self.timeout.as_millis() as u64,
            in_flight = self.in_flight,
            "{}", self
        );
    }
}

/// The fan-out completed and handed the aggregate back.
///
/// # Log Level
/// `debug!` - Per-task event
pub struct FanOutCompleted<'a> {
    pub stage: &'a str,
    pub task_id: &'a str,
    pub dispatched: usize,
    pub aggregated: usize,
    pub failed: bool,
}

impl Display for FanOutCompleted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Fan-out '{}' completed task {}: dispatched={}, aggregated={}, failed={}",
            self.stage, self.task_id, self.dispatched, self.aggregated, self.failed
        )
    }
}

impl StructuredLog for FanOutCompleted<'_> {
    fn log(&self) {
        tracing::debug!(
            stage = self.stage,
            task_id = self.task_id,
            dispatched = self.dispatched,
            aggregated = self.aggregated,
            failed = self.failed,
            "{}", self
        );
    }
}
