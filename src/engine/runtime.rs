// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::config::consts::DEFAULT_SHUTDOWN_TIMEOUT_MS;
use crate::engine::continuation_pool::ContinuationPool;
use crate::engine::gate::RunGate;
use crate::engine::resource_pool::ResourcePool;
use crate::errors::{ProtocolError, TaskFailure};
use crate::observability::messages::engine::{
    EngineDrainTimedOut, EngineStopped, EngineStopping, SubmissionRejected, TaskCompleted,
    TaskSubmitted,
};
use crate::observability::messages::StructuredLog;
use crate::task::Task;
use crate::traits::{Continuation, Stage};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, Notify};

/// Counts tasks between submission and their final continuation.
#[derive(Default)]
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

impl InFlight {
    fn enter(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    fn leave(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }

    fn current(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Wait until nothing is in flight. Returns `false` on timeout.
    async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.current() == 0 {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.current() == 0;
            }
        }
    }
}

/// Entry point for routing tasks through a head stage.
///
/// The engine attaches a lifecycle tracker to every submitted task, runs the
/// head stage, and when the head's continuation fires drains the tracker's
/// completion listeners before handing the task back.
pub struct Engine {
    head: Arc<dyn Stage>,
    gate: RunGate,
    continuation_pool: Option<Arc<ContinuationPool>>,
    resource_pool: Option<Arc<ResourcePool>>,
    shutdown_timeout: Duration,
    in_flight: Arc<InFlight>,
}

impl Engine {
    pub fn new(head: Arc<dyn Stage>) -> Self {
        Self {
            head,
            gate: RunGate::new(),
            continuation_pool: None,
            resource_pool: None,
            shutdown_timeout: Duration::from_millis(DEFAULT_SHUTDOWN_TIMEOUT_MS),
            in_flight: Arc::new(InFlight::default()),
        }
    }

    /// Share a gate that stages were built with.
    pub fn with_gate(mut self, gate: RunGate) -> Self {
        self.gate = gate;
        self
    }

    /// Stopped by [`Engine::shutdown`] after in-flight tasks drained.
    pub fn with_continuation_pool(mut self, pool: Arc<ContinuationPool>) -> Self {
        self.continuation_pool = Some(pool);
        self
    }

    /// Shut down by [`Engine::shutdown`] after in-flight tasks drained.
    pub fn with_resource_pool(mut self, pool: Arc<ResourcePool>) -> Self {
        self.resource_pool = Some(pool);
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn gate(&self) -> &RunGate {
        &self.gate
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.current()
    }

    /// Callback form of [`Engine::submit`].
    ///
    /// Returns `true` when `callback` already ran on this thread. Once the
    /// engine is stopping the task is failed with `Shutdown` and handed
    /// straight back.
    pub fn submit_with<F>(&self, mut task: Task, callback: F) -> bool
    where
        F: FnOnce(Task) + Send + 'static,
    {
        if !self.gate.is_accepting() {
            SubmissionRejected {
                task_id: task.id(),
                gate_state: self.gate.state().as_str(),
            }
            .log();
            task.set_failure(TaskFailure::shutdown(format!(
                "engine is {}",
                self.gate.state().as_str()
            )));
            callback(task);
            return true;
        }

        let submitted = TaskSubmitted {
            task_id: task.id(),
            stage: self.head.name(),
        };
        let span = submitted.span("submit");
        let _guard = span.enter();
        submitted.log();

        task.ensure_tracker();
        self.in_flight.enter();
        let in_flight = Arc::clone(&self.in_flight);
        let done = Continuation::new(move |mut task: Task, _| {
            let listeners = task.complete_lifecycle();
            TaskCompleted {
                task_id: task.id(),
                outcome: task.outcome().as_str(),
                listeners,
            }
            .log();
            callback(task);
            in_flight.leave();
        });

        self.head.process(task, done)
    }

    /// Route `task` through the head stage and wait for the result.
    pub async fn submit(&self, task: Task) -> Result<Task, ProtocolError> {
        let (tx, rx) = oneshot::channel();
        self.submit_with(task, move |task| {
            let _ = tx.send(task);
        });
        rx.await.map_err(|_| ProtocolError::ContinuationDropped {
            stage: self.head.name().to_string(),
        })
    }

    /// Refuse new tasks, wait for in-flight ones (up to the shutdown
    /// timeout), then stop the pools and tear the gate down.
    pub async fn shutdown(&self) {
        let started = Instant::now();
        EngineStopping.log();
        self.gate.begin_stop();

        if !self.in_flight.wait_idle(self.shutdown_timeout).await {
            EngineDrainTimedOut {
                in_flight: self.in_flight.current(),
                timeout: self.shutdown_timeout,
            }
            .log();
        }
        if let Some(pool) = &self.continuation_pool {
            pool.shutdown().await;
        }
        if let Some(pool) = &self.resource_pool {
            pool.shutdown();
        }
        self.gate.stop();

        EngineStopped {
            duration: started.elapsed(),
        }
        .log();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::stub::{DelayedStage, DroppingStage};
    use crate::errors::FailureKind;
    use crate::traits::FnStage;
    use serde_json::json;
    use std::sync::Mutex;

    #[tokio::test]
    async fn test_submit_runs_completion_listeners_in_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let first = Arc::clone(&order);
        let second = Arc::clone(&order);
        let head = FnStage::new("register", move |task: &mut Task| {
            let first = Arc::clone(&first);
            let second = Arc::clone(&second);
            task.on_completion(move |_| first.lock().unwrap().push(1));
            task.on_completion(move |_| second.lock().unwrap().push(2));
        });
        let engine = Engine::new(Arc::new(head));

        let task = engine.submit(Task::new("x")).await.unwrap();

        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
        assert!(task.tracker().unwrap().is_completed());
        assert_eq!(engine.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_submit_with_reports_sync_completion() {
        let engine = Engine::new(Arc::new(FnStage::new("noop", |_: &mut Task| {})));
        let slot = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&slot);

        assert!(engine.submit_with(Task::new(1), move |task| {
            *sink.lock().unwrap() = Some(task);
        }));
        assert_eq!(slot.lock().unwrap().take().unwrap().body(), &json!(1));
    }

    #[tokio::test]
    async fn test_stopping_engine_rejects_submissions() {
        let engine = Engine::new(Arc::new(FnStage::new("noop", |_: &mut Task| {})));
        engine.gate().begin_stop();

        let task = engine.submit(Task::new("late")).await.unwrap();
        assert_eq!(task.failure().map(|f| f.kind()), Some(FailureKind::Shutdown));
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_in_flight_tasks() {
        let engine = Arc::new(Engine::new(Arc::new(DelayedStage::new(
            "slow",
            Duration::from_millis(30),
        ))));
        let (tx, rx) = oneshot::channel();
        engine.submit_with(Task::new("x"), move |task| {
            let _ = tx.send(task);
        });
        assert_eq!(engine.in_flight(), 1);

        engine.shutdown().await;

        assert_eq!(engine.in_flight(), 0);
        assert!(engine.gate().is_torn_down());
        assert!(!rx.await.unwrap().is_failed());
    }

    #[tokio::test]
    async fn test_shutdown_times_out_on_lost_tasks() {
        let engine = Engine::new(Arc::new(DroppingStage))
            .with_shutdown_timeout(Duration::from_millis(10));
        assert!(engine.submit(Task::new("lost")).await.is_err());

        engine.shutdown().await;
        assert!(engine.gate().is_torn_down());
        assert_eq!(engine.in_flight(), 1);
    }
}
