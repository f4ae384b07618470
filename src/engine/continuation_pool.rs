// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::engine::gate::RunGate;
use crate::errors::{ProtocolError, TaskFailure};
use crate::observability::messages::pool::{
    ContinuationPoolStarted, ContinuationPoolStopped, ContinuationRejected,
};
use crate::observability::messages::StructuredLog;
use crate::task::Task;
use crate::traits::{Continuation, Stage};
use crate::utils::{current_runtime, lock};
use serde::Deserialize;
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::task::TaskTracker;

/// What happens to a job the pool cannot queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RejectionPolicy {
    /// Fail the task with `Capacity` and run its continuation on the caller.
    #[default]
    CallerRuns,
    /// Fail the task with `Shutdown` and run its continuation on the caller.
    Abort,
}

struct Job {
    task: Task,
    done: Continuation,
}

/// Fixed set of runtime workers that run continuations off the submitting
/// thread, fed through a bounded queue.
pub struct ContinuationPool {
    name: String,
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    workers: TaskTracker,
    gate: RunGate,
    rejection: RejectionPolicy,
}

impl ContinuationPool {
    /// Spawn `workers` workers on the current Tokio runtime.
    pub fn new(
        name: impl Into<String>,
        workers: usize,
        queue_capacity: usize,
        rejection: RejectionPolicy,
    ) -> Result<Self, ProtocolError> {
        let name = name.into();
        let runtime = current_runtime(&name)?;
        Ok(Self::on_runtime(
            &runtime,
            name,
            workers,
            queue_capacity,
            rejection,
        ))
    }

    /// Spawn `workers` workers on `runtime`.
    ///
    /// Both `workers` and `queue_capacity` are raised to at least 1.
    pub fn on_runtime(
        runtime: &Handle,
        name: impl Into<String>,
        workers: usize,
        queue_capacity: usize,
        rejection: RejectionPolicy,
    ) -> Self {
        let name = name.into();
        let workers = workers.max(1);
        let queue_capacity = queue_capacity.max(1);
        let (sender, receiver) = mpsc::channel::<Job>(queue_capacity);
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));

        let tracker = TaskTracker::new();
        for _ in 0..workers {
            let receiver = Arc::clone(&receiver);
            tracker.spawn_on(
                async move {
                    loop {
                        let job = receiver.lock().await.recv().await;
                        match job {
                            Some(Job { task, done }) => done.done(task, false),
                            None => break,
                        }
                    }
                },
                runtime,
            );
        }
        tracker.close();

        ContinuationPoolStarted {
            pool: &name,
            workers,
            queue_capacity,
        }
        .log();

        Self {
            name,
            sender: Mutex::new(Some(sender)),
            workers: tracker,
            gate: RunGate::new(),
            rejection,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_accepting(&self) -> bool {
        self.gate.is_accepting()
    }

    /// Queue `done(task)` for a worker.
    ///
    /// Returns `false` when queued. On rejection the task carries a
    /// `Capacity` or `Shutdown` failure, `done` has already run on this
    /// thread, and the return value is `true`.
    pub fn submit(&self, task: Task, done: Continuation) -> bool {
        let sender = lock(&self.sender).clone();
        let Some(sender) = sender else {
            return self.reject(Job { task, done }, TaskFailure::shutdown(self.stopped_message()));
        };

        match sender.try_send(Job { task, done }) {
            Ok(()) => false,
            Err(TrySendError::Full(job)) => {
                let failure = match self.rejection {
                    RejectionPolicy::CallerRuns => TaskFailure::capacity(format!(
                        "continuation pool '{}' queue is full",
                        self.name
                    )),
                    RejectionPolicy::Abort => TaskFailure::shutdown(format!(
                        "continuation pool '{}' queue is full, job aborted",
                        self.name
                    )),
                };
                self.reject(job, failure)
            }
            Err(TrySendError::Closed(job)) => {
                self.reject(job, TaskFailure::shutdown(self.stopped_message()))
            }
        }
    }

    /// Refuse new jobs, let workers drain what is queued, and wait for them.
    pub async fn shutdown(&self) {
        self.gate.begin_stop();
        lock(&self.sender).take();
        self.workers.wait().await;
        self.gate.stop();
        ContinuationPoolStopped { pool: &self.name }.log();
    }

    fn reject(&self, job: Job, failure: TaskFailure) -> bool {
        let Job { mut task, done } = job;
        ContinuationRejected {
            pool: &self.name,
            task_id: task.id(),
            reason: failure.message(),
        }
        .log();
        task.set_failure(failure);
        done.done(task, true);
        true
    }

    fn stopped_message(&self) -> String {
        format!("continuation pool '{}' is stopped", self.name)
    }
}

/// Continues the route on a [`ContinuationPool`] worker.
pub struct HandoffStage {
    pool: Arc<ContinuationPool>,
}

impl HandoffStage {
    pub fn new(pool: Arc<ContinuationPool>) -> Self {
        Self { pool }
    }
}

impl Stage for HandoffStage {
    fn process(&self, task: Task, done: Continuation) -> bool {
        self.pool.submit(task, done)
    }

    fn name(&self) -> &str {
        self.pool.name()
    }
}
