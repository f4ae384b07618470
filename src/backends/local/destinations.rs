// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Synchronous in-process endpoints that a [`LocalHandleFactory`] hands out
//! as pooled handles.
//!
//! [`LocalHandleFactory`]: super::LocalHandleFactory

use crate::errors::TaskFailure;
use crate::observability::messages::processor::TaskDelivered;
use crate::observability::messages::StructuredLog;
use crate::task::Task;
use crate::traits::{Continuation, Stage};
use crate::utils::lock;
use anyhow::anyhow;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn body_text(task: &Task) -> String {
    match task.body() {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Logs every delivered task at `info!`.
pub struct LogDestination {
    key: String,
}

impl LogDestination {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl Stage for LogDestination {
    fn process(&self, task: Task, done: Continuation) -> bool {
        TaskDelivered {
            destination: &self.key,
            task_id: task.id(),
            body: &body_text(&task),
        }
        .log();
        done.done(task, true);
        true
    }

    fn name(&self) -> &str {
        &self.key
    }
}

/// Keeps the body of every delivered task. Handles created for the same key
/// share one inbox.
pub struct RecordingDestination {
    key: String,
    inbox: Arc<Mutex<Vec<Value>>>,
}

impl RecordingDestination {
    pub fn new(key: impl Into<String>, inbox: Arc<Mutex<Vec<Value>>>) -> Self {
        Self {
            key: key.into(),
            inbox,
        }
    }
}

impl Stage for RecordingDestination {
    fn process(&self, task: Task, done: Continuation) -> bool {
        lock(&self.inbox).push(task.body().clone());
        done.done(task, true);
        true
    }

    fn name(&self) -> &str {
        &self.key
    }
}

/// Fails with `Transient` until `failures` deliveries have been attempted
/// across every handle for the key, then behaves like [`LogDestination`].
pub struct FlakyDestination {
    key: String,
    failures: usize,
    attempts: Arc<AtomicUsize>,
}

impl FlakyDestination {
    pub fn new(key: impl Into<String>, failures: usize, attempts: Arc<AtomicUsize>) -> Self {
        Self {
            key: key.into(),
            failures,
            attempts,
        }
    }
}

impl Stage for FlakyDestination {
    fn process(&self, mut task: Task, done: Continuation) -> bool {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.failures {
            task.set_failure(TaskFailure::transient(anyhow!(
                "'{}' unavailable (attempt {} of {} planned failures)",
                self.key,
                attempt,
                self.failures
            )));
        } else {
            TaskDelivered {
                destination: &self.key,
                task_id: task.id(),
                body: &body_text(&task),
            }
            .log();
        }
        done.done(task, true);
        true
    }

    fn name(&self) -> &str {
        &self.key
    }
}

/// Rejects every task with a `Terminal` failure.
pub struct RejectingDestination {
    key: String,
    reason: String,
}

impl RejectingDestination {
    pub fn new(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

impl Stage for RejectingDestination {
    fn process(&self, mut task: Task, done: Continuation) -> bool {
        task.set_failure(TaskFailure::terminal(anyhow!(
            "'{}' rejected task: {}",
            self.key,
            self.reason
        )));
        done.done(task, true);
        true
    }

    fn name(&self) -> &str {
        &self.key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::FailureKind;
    use crate::traits::run;
    use serde_json::json;

    #[tokio::test]
    async fn test_recording_destinations_share_inbox() {
        let inbox = Arc::new(Mutex::new(Vec::new()));
        let a = RecordingDestination::new("record:audit", Arc::clone(&inbox));
        let b = RecordingDestination::new("record:audit", Arc::clone(&inbox));

        run(&a, Task::new("one")).await.unwrap();
        run(&b, Task::new("two")).await.unwrap();

        assert_eq!(*inbox.lock().unwrap(), vec![json!("one"), json!("two")]);
    }

    #[tokio::test]
    async fn test_flaky_destination_recovers_after_planned_failures() {
        let flaky = FlakyDestination::new("flaky:2", 2, Arc::new(AtomicUsize::new(0)));

        for _ in 0..2 {
            let task = run(&flaky, Task::new("x")).await.unwrap();
            assert_eq!(task.failure().map(|f| f.kind()), Some(FailureKind::Transient));
        }
        let task = run(&flaky, Task::new("x")).await.unwrap();
        assert!(!task.is_failed());
    }

    #[tokio::test]
    async fn test_rejecting_destination_fails_terminally() {
        let task = run(&RejectingDestination::new("fail", "closed"), Task::new("x"))
            .await
            .unwrap();
        assert_eq!(task.failure().map(|f| f.kind()), Some(FailureKind::Terminal));
    }
}
