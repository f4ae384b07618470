// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The stage/continuation protocol.
//!
//! A [`Stage`] receives a task by value together with a [`Continuation`] and
//! must do exactly one of:
//!
//! 1. finish the work, call `done.done(task, true)` and return `true`, or
//! 2. hand the work off (spawned future, timer, queue), return `false`, and
//!    have whoever completes it call `done.done(task, false)` exactly once.
//!
//! `Continuation::done` consumes the continuation, so calling it twice does not
//! compile. Dropping a continuation without calling it loses the task and is
//! logged as a defect.
//!
//! Stages that compose other stages use [`dispatch`] to get the task back
//! directly when the inner stage completed synchronously, and to be resumed
//! with their own state value when it did not.

use crate::errors::ProtocolError;
use crate::observability::messages::stage::{ContinuationDropped, StageContractViolation};
use crate::observability::messages::StructuredLog;
use crate::task::Task;
use crate::utils::lock;
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

pub trait Stage: Send + Sync {
    /// Process `task` and eventually invoke `done`.
    ///
    /// Returns `true` when `done` was invoked before returning.
    fn process(&self, task: Task, done: Continuation) -> bool;

    fn name(&self) -> &str {
        "stage"
    }
}

impl<S: Stage + ?Sized> Stage for Arc<S> {
    fn process(&self, task: Task, done: Continuation) -> bool {
        (**self).process(task, done)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

type Callback = Box<dyn FnOnce(Task, bool) + Send + 'static>;

/// The rest of the route, invoked exactly once with the finished task.
pub struct Continuation {
    callback: Option<Callback>,
}

impl Continuation {
    pub fn new<F>(callback: F) -> Self
    where
        F: FnOnce(Task, bool) + Send + 'static,
    {
        Self {
            callback: Some(Box::new(callback)),
        }
    }

    /// Hand the task to the rest of the route.
    ///
    /// `completed_sync` is `true` only when called on the thread that invoked
    /// [`Stage::process`], before it returned.
    pub fn done(mut self, task: Task, completed_sync: bool) {
        if let Some(callback) = self.callback.take() {
            callback(task, completed_sync);
        }
    }
}

impl Drop for Continuation {
    fn drop(&mut self) {
        if self.callback.is_some() {
            ContinuationDropped.log();
        }
    }
}

impl fmt::Debug for Continuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Continuation")
            .field("pending", &self.callback.is_some())
            .finish()
    }
}

/// Result of [`dispatch`].
#[derive(Debug)]
pub enum Dispatched<S> {
    /// The stage completed before returning; the caller keeps going.
    Completed(Task, S),
    /// The stage suspended; `resume` will be called with the task and state.
    Suspended,
}

enum Handoff<S> {
    Pending,
    Parked(Task, S),
    Detached,
}

/// Run `stage` with a continuation that either parks the result for the
/// caller (if it fires before `process` returns) or calls `resume` (if it
/// fires afterwards).
///
/// The per-invocation `state` travels with the continuation, so composing
/// stages need no thread-local bookkeeping to tell the two paths apart.
pub fn dispatch<S, F>(stage: &dyn Stage, task: Task, state: S, resume: F) -> Dispatched<S>
where
    S: Send + 'static,
    F: FnOnce(Task, S) + Send + 'static,
{
    let cell = Arc::new(Mutex::new(Handoff::Pending));
    let continuation_cell = Arc::clone(&cell);

    let done = Continuation::new(move |task, _completed_sync| {
        let mut handoff = lock(&continuation_cell);
        if matches!(*handoff, Handoff::Pending) {
            *handoff = Handoff::Parked(task, state);
            return;
        }
        drop(handoff);
        resume(task, state);
    });

    let returned_sync = stage.process(task, done);

    let mut handoff = lock(&cell);
    match std::mem::replace(&mut *handoff, Handoff::Detached) {
        // A stage may legitimately return false after its continuation fired
        // on another thread; the task is parked either way.
        Handoff::Parked(task, state) => Dispatched::Completed(task, state),
        Handoff::Pending | Handoff::Detached => {
            if returned_sync {
                StageContractViolation {
                    stage: stage.name(),
                    returned_sync,
                }
                .log();
            }
            Dispatched::Suspended
        }
    }
}

/// Drive a stage from async code and wait for its continuation.
pub async fn run(stage: &dyn Stage, task: Task) -> Result<Task, ProtocolError> {
    let (tx, rx) = oneshot::channel();
    stage.process(
        task,
        Continuation::new(move |task, _| {
            let _ = tx.send(task);
        }),
    );
    rx.await.map_err(|_| ProtocolError::ContinuationDropped {
        stage: stage.name().to_string(),
    })
}

/// A stage backed by a synchronous closure. Always completes synchronously.
pub struct FnStage<F> {
    name: String,
    f: F,
}

impl<F> FnStage<F>
where
    F: Fn(&mut Task) + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> Stage for FnStage<F>
where
    F: Fn(&mut Task) + Send + Sync,
{
    fn process(&self, mut task: Task, done: Continuation) -> bool {
        (self.f)(&mut task);
        done.done(task, true);
        true
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::stub::{DelayedStage, DroppingStage};
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn test_dispatch_sync_path_returns_task_and_state() {
        let stage = FnStage::new("upper", |task: &mut Task| {
            let upper = task.body().as_str().unwrap_or_default().to_uppercase();
            task.set_body(upper);
        });

        let resumed = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&resumed);
        let result = dispatch(&stage, Task::new("abc"), 7usize, move |_, _| {
            *flag.lock().unwrap() = true;
        });

        match result {
            Dispatched::Completed(task, state) => {
                assert_eq!(task.body(), &json!("ABC"));
                assert_eq!(state, 7);
            }
            Dispatched::Suspended => panic!("expected synchronous completion"),
        }
        assert!(!*resumed.lock().unwrap());
    }

    #[tokio::test]
    async fn test_dispatch_async_path_resumes_with_state() {
        let stage = DelayedStage::new("slow", Duration::from_millis(10));
        let (tx, rx) = oneshot::channel();

        let result = dispatch(&stage, Task::new("x"), "state", move |task, state| {
            let _ = tx.send((task, state));
        });

        assert!(matches!(result, Dispatched::Suspended));
        let (task, state) = rx.await.unwrap();
        assert_eq!(state, "state");
        assert_eq!(task.body(), &json!("x"));
    }

    #[tokio::test]
    async fn test_run_bridges_sync_and_async_stages() {
        let sync = FnStage::new("tag", |task: &mut Task| task.set_header("seen", true));
        let task = run(&sync, Task::new(1)).await.unwrap();
        assert_eq!(task.header("seen"), Some(&json!(true)));

        let delayed = DelayedStage::new("slow", Duration::from_millis(5));
        let task = run(&delayed, Task::new(2)).await.unwrap();
        assert_eq!(task.body(), &json!(2));
    }

    #[tokio::test]
    async fn test_run_reports_dropped_continuation() {
        let err = run(&DroppingStage, Task::new("lost")).await.unwrap_err();
        assert!(matches!(err, ProtocolError::ContinuationDropped { .. }));
    }
}
