// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for the built-in local processors and destinations.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use tracing::Span;

/// A processor started working on a task.
///
/// # Log Level
/// `debug!` - Per-task execution event
///
/// # Example
/// ```
/// use switchyard::observability::messages::processor::ProcessorExecutionStarted;
///
/// let msg = ProcessorExecutionStarted {
///     processor: "reverse_text",
///     task_id: "6f1c",
///     input_size: 12,
/// };
///
/// tracing::debug!("{}", msg);
/// ```
pub struct ProcessorExecutionStarted<'a> {
    pub processor: &'a str,
    pub task_id: &'a str,
    pub input_size: usize,
}

impl Display for ProcessorExecutionStarted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Processor '{}' started on task {} ({} bytes)",
            self.processor, self.task_id, self.input_size
        )
    }
}

impl StructuredLog for ProcessorExecutionStarted<'_> {
    fn log(&self) {
        tracing::debug!(
            processor = self.processor,
            task_id = self.task_id,
            input_size = self.input_size,
            "{}",
            self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "processor_execution",
            span_name = name,
            processor = self.processor,
            task_id = self.task_id,
        )
    }
}

/// A processor finished a task.
///
/// # Log Level
/// `debug!` - Per-task execution event
pub struct ProcessorExecutionCompleted<'a> {
    pub processor: &'a str,
    pub task_id: &'a str,
    pub output_size: usize,
    pub duration: Duration,
}

impl Display for ProcessorExecutionCompleted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Processor '{}' completed task {} in {:?} ({} bytes)",
            self.processor, self.task_id, self.duration, self.output_size
        )
    }
}

impl StructuredLog for ProcessorExecutionCompleted<'_> {
    fn log(&self) {
        tracing::debug!(
            processor = self.processor,
            task_id = self.task_id,
            output_size = self.output_size,
            duration_ms = self.duration.as_millis() as u64,
            "{}",
            self
        );
    }
}

/// A processor could not handle a task's body.
///
/// # Log Level
/// `warn!` - The task carries the failure onwards
pub struct ProcessorExecutionFailed<'a> {
    pub processor: &'a str,
    pub task_id: &'a str,
    pub error: &'a str,
}

impl Display for ProcessorExecutionFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Processor '{}' failed task {}: {}",
            self.processor, self.task_id, self.error
        )
    }
}

impl StructuredLog for ProcessorExecutionFailed<'_> {
    fn log(&self) {
        tracing::warn!(
            processor = self.processor,
            task_id = self.task_id,
            error = self.error,
            "{}",
            self
        );
    }
}

/// A local destination accepted a task.
///
/// # Log Level
/// `info!` - Delivery to an endpoint
pub struct TaskDelivered<'a> {
    pub destination: &'a str,
    pub task_id: &'a str,
    pub body: &'a str,
}

impl Display for TaskDelivered<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Delivered task {} to '{}': {}",
            self.task_id, self.destination, self.body
        )
    }
}

impl StructuredLog for TaskDelivered<'_> {
    fn log(&self) {
        tracing::info!(
            destination = self.destination,
            task_id = self.task_id,
            body = self.body,
            "{}",
            self
        );
    }
}
