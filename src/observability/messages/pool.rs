// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for the resource pool and the continuation pool.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};

/// A new handle was created for a destination.
///
/// # Log Level
/// `debug!`
pub struct HandleCreated<'a> {
    pub destination: &'a str,
    pub handle_id: u64,
}

impl Display for HandleCreated<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Created handle #{} for destination '{}'",
            self.handle_id, self.destination
        )
    }
}

impl StructuredLog for HandleCreated<'_> {
    fn log(&self) {
        tracing::debug!(
            destination = self.destination,
            handle_id = self.handle_id,
            "{}", self
        );
    }
}

/// The handle factory could not create a handle.
///
/// # Log Level
/// `warn!` - Surfaces as a `ResourceCreation` failure on the task
pub struct HandleCreationFailed<'a> {
    pub destination: &'a str,
    pub error: &'a str,
}

impl Display for HandleCreationFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Failed to create handle for destination '{}': {}",
            self.destination, self.error
        )
    }
}

impl StructuredLog for HandleCreationFailed<'_> {
    fn log(&self) {
        tracing::warn!(
            destination = self.destination,
            error = self.error,
            "{}", self
        );
    }
}

/// Destroying a handle failed; the error is swallowed.
///
/// # Log Level
/// `warn!`
pub struct HandleDestroyFailed<'a> {
    pub destination: &'a str,
    pub handle_id: u64,
    pub error: &'a str,
}

impl Display for HandleDestroyFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Failed to destroy handle #{} for destination '{}': {}",
            self.handle_id, self.destination, self.error
        )
    }
}

impl StructuredLog for HandleDestroyFailed<'_> {
    fn log(&self) {
        tracing::warn!(
            destination = self.destination,
            handle_id = self.handle_id,
            error = self.error,
            "{}", self
        );
    }
}

/// The resource pool was shut down.
///
/// # Log Level
/// `info!`
pub struct ResourcePoolShutdown {
    pub destroyed: usize,
}

impl Display for ResourcePoolShutdown {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Resource pool shut down, destroyed {} idle handles",
            self.destroyed
        )
    }
}

impl StructuredLog for ResourcePoolShutdown {
    fn log(&self) {
        tracing::info!(destroyed = self.destroyed, "{}", self);
    }
}

/// The continuation pool started its workers.
///
/// # Log Level
/// `info!` - Important operational event
pub struct ContinuationPoolStarted<'a> {
    pub pool: &'a str,
    pub workers: usize,
    pub queue_capacity: usize,
}

impl Display for ContinuationPoolStarted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Continuation pool '{}' started: workers={}, queue_capacity={}",
            self.pool, self.workers, self.queue_capacity
        )
    }
}

impl StructuredLog for ContinuationPoolStarted<'_> {
    fn log(&self) {
        tracing::info!(
            pool = self.pool,
            workers = self.workers,
            queue_capacity = self.queue_capacity,
            "{}", self
        );
    }
}

/// The continuation pool refused a job.
///
/// # Log Level
/// `warn!` - The task fails with `Capacity` or `Shutdown`
pub struct ContinuationRejected<'a> {
    pub pool: &'a str,
    pub task_id: &'a str,
    pub reason: &'a str,
}

impl Display for ContinuationRejected<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Continuation pool '{}' rejected task {}: {}",
            self.pool, self.task_id, self.reason
        )
    }
}

impl StructuredLog for ContinuationRejected<'_> {
    fn log(&self) {
        tracing::warn!(
            pool = self.pool,
            task_id = self.task_id,
            reason = self.reason,
            "{}", self
        );
    }
}

/// The continuation pool drained and its workers exited.
///
/// # Log Level
/// `info!`
pub struct ContinuationPoolStopped<'a> {
    pub pool: &'a str,
}

impl Display for ContinuationPoolStopped<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Continuation pool '{}' stopped", self.pool)
    }
}

impl StructuredLog for ContinuationPoolStopped<'_> {
    fn log(&self) {
        tracing::info!(pool = self.pool, "{}", self);
    }
}
