// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for engine submission and lifecycle events.
//!
//! This module contains message types for logging events related to:
//! * Task submission and completion at the top level
//! * Submissions refused by the run gate
//! * Engine shutdown

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// A task entered the engine.
///
/// # Log Level
/// `debug!` - High volume per-task event
///
/// # Example
/// ```
/// use switchyard::observability::messages::engine::TaskSubmitted;
///
/// let msg = TaskSubmitted {
///     task_id: "6f1c",
///     stage: "orders",
/// };
///
/// tracing::debug!("{}", msg);
/// ```
pub struct TaskSubmitted<'a> {
    pub task_id: &'a str,
    pub stage: &'a str,
}

impl Display for TaskSubmitted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Task {} submitted to '{}'", self.task_id, self.stage)
    }
}

impl StructuredLog for TaskSubmitted<'_> {
    fn log(&self) {
        tracing::debug!(task_id = self.task_id, stage = self.stage, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "task",
            span_name = name,
            task_id = self.task_id,
            stage = self.stage,
        )
    }
}

/// A task left the engine and its completion listeners ran.
///
/// # Log Level
/// `debug!` - High volume per-task event
pub struct TaskCompleted<'a> {
    pub task_id: &'a str,
    pub outcome: &'a str,
    pub listeners: usize,
}

impl Display for TaskCompleted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Task {} completed as {} ({} completion listeners)",
            self.task_id, self.outcome, self.listeners
        )
    }
}

impl StructuredLog for TaskCompleted<'_> {
    fn log(&self) {
        tracing::debug!(
            task_id = self.task_id,
            outcome = self.outcome,
            listeners = self.listeners,
            "{}", self
        );
    }
}

/// The engine refused a submission because it is stopping or stopped.
///
/// # Log Level
/// `warn!` - Work was turned away
pub struct SubmissionRejected<'a> {
    pub task_id: &'a str,
    pub gate_state: &'a str,
}

impl Display for SubmissionRejected<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Rejected task {}: engine is {}",
            self.task_id, self.gate_state
        )
    }
}

impl StructuredLog for SubmissionRejected<'_> {
    fn log(&self) {
        tracing::warn!(
            task_id = self.task_id,
            gate_state = self.gate_state,
            "{}", self
        );
    }
}

/// Engine shutdown began.
///
/// # Log Level
/// `info!` - Important operational event
pub struct EngineStopping;

impl Display for EngineStopping {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Engine stopping: refusing new tasks and draining pools")
    }
}

impl StructuredLog for EngineStopping {
    fn log(&self) {
        tracing::info!("{}", self);
    }
}

/// Shutdown gave up waiting for in-flight tasks.
///
/// # Log Level
/// `warn!` - Remaining tasks finish against stopped pools
pub struct EngineDrainTimedOut {
    pub in_flight: usize,
    pub timeout: std::time::Duration,
}

impl Display for EngineDrainTimedOut {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Engine shutdown stopped waiting after {:?} with {} tasks in flight",
            self.timeout, self.in_flight
        )
    }
}

impl StructuredLog for EngineDrainTimedOut {
    fn log(&self) {
        tracing::warn!(
            in_flight = self.in_flight,
            timeout_ms = self.timeout.as_millis() as u64,
            "{}",
            self
        );
    }
}

/// Engine shutdown finished.
///
/// # Log Level
/// `info!` - Important operational event
pub struct EngineStopped {
    pub duration: std::time::Duration,
}

impl Display for EngineStopped {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Engine stopped in {:?}", self.duration)
    }
}

impl StructuredLog for EngineStopped {
    fn log(&self) {
        tracing::info!(duration_ms = self.duration.as_millis() as u64, "{}", self);
    }
}
