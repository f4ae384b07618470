// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Classification of a failure carried by a task.
///
/// The kind drives redelivery eligibility: only [`FailureKind::is_retryable`]
/// kinds are ever redelivered, regardless of what the exception policy says.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Temporary condition at a destination; worth trying again.
    Transient,
    /// Permanent failure; retrying cannot help.
    Terminal,
    /// A pooled handle for a destination could not be created.
    ResourceCreation,
    /// A bounded queue refused the work.
    Capacity,
    /// The engine or a pool is stopping or stopped.
    Shutdown,
    /// A fan-out did not complete within its deadline.
    Timeout,
    /// A stage explicitly asked for the task to be rolled back.
    RollbackRequested,
}

impl FailureKind {
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            FailureKind::Transient
                | FailureKind::ResourceCreation
                | FailureKind::Capacity
                | FailureKind::Timeout
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::Transient => "transient",
            FailureKind::Terminal => "terminal",
            FailureKind::ResourceCreation => "resource_creation",
            FailureKind::Capacity => "capacity",
            FailureKind::Shutdown => "shutdown",
            FailureKind::Timeout => "timeout",
            FailureKind::RollbackRequested => "rollback_requested",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure attached to a task.
///
/// Failures travel with the task through continuations instead of being
/// returned up a call stack, so the type is cheap to clone: the optional cause
/// is shared behind an `Arc`.
#[derive(Debug, Clone)]
pub struct TaskFailure {
    kind: FailureKind,
    message: String,
    source: Option<Arc<anyhow::Error>>,
    suppressed: Vec<TaskFailure>,
}

impl TaskFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
            suppressed: Vec::new(),
        }
    }

    /// Wrap an arbitrary error as the cause of a failure of the given kind.
    pub fn from_error(kind: FailureKind, error: impl Into<anyhow::Error>) -> Self {
        let error = error.into();
        Self {
            kind,
            message: error.to_string(),
            source: Some(Arc::new(error)),
            suppressed: Vec::new(),
        }
    }

    pub fn transient(error: impl Into<anyhow::Error>) -> Self {
        Self::from_error(FailureKind::Transient, error)
    }

    pub fn terminal(error: impl Into<anyhow::Error>) -> Self {
        Self::from_error(FailureKind::Terminal, error)
    }

    pub fn resource_creation(destination: &str, error: impl Into<anyhow::Error>) -> Self {
        let error = error.into();
        Self {
            kind: FailureKind::ResourceCreation,
            message: format!("failed to create handle for '{}': {}", destination, error),
            source: Some(Arc::new(error)),
            suppressed: Vec::new(),
        }
    }

    pub fn capacity(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Capacity, message)
    }

    pub fn shutdown(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Shutdown, message)
    }

    pub fn timeout(after: Duration) -> Self {
        Self::new(
            FailureKind::Timeout,
            format!("did not complete within {:?}", after),
        )
    }

    pub fn rollback(message: impl Into<String>) -> Self {
        Self::new(FailureKind::RollbackRequested, message)
    }

    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// The underlying cause, if the failure wraps one.
    pub fn cause(&self) -> Option<&anyhow::Error> {
        self.source.as_deref()
    }

    pub fn suppressed(&self) -> &[TaskFailure] {
        &self.suppressed
    }

    /// Attach a secondary failure that occurred while handling this one.
    pub fn with_suppressed(mut self, other: TaskFailure) -> Self {
        self.suppressed.push(other);
        self
    }

    /// True when the outermost cause is an `E`. A context-wrapped `E` does
    /// not count; use [`TaskFailure::has_cause`] for that.
    pub fn is_error<E>(&self) -> bool
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source
            .as_ref()
            .and_then(|err| err.chain().next())
            .is_some_and(|head| head.is::<E>())
    }

    /// True when an `E` appears anywhere in the cause chain.
    pub fn has_cause<E>(&self) -> bool
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source
            .as_ref()
            .is_some_and(|err| err.chain().any(|cause| cause.is::<E>()))
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failure: {}", self.kind, self.message)?;
        if !self.suppressed.is_empty() {
            write!(f, " ({} suppressed)", self.suppressed.len())?;
        }
        Ok(())
    }
}

impl std::error::Error for TaskFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|err| -> &(dyn std::error::Error + 'static) { err.as_ref() })
    }
}
