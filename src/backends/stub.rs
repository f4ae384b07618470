// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::errors::{FailureKind, TaskFailure};
use crate::task::{RollbackScope, ScopeMarker, Task};
use crate::traits::{Continuation, Destination, HandleFactory, ScopeHooks, Stage};
use crate::utils::lock;
use anyhow::anyhow;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Sets the body to the destination key it was created for.
pub struct EchoStage {
    pub key: String,
}

impl Stage for EchoStage {
    fn process(&self, mut task: Task, done: Continuation) -> bool {
        task.set_body(self.key.clone());
        done.done(task, true);
        true
    }

    fn name(&self) -> &str {
        &self.key
    }
}

/// Handle factory for pool and fan-out tests.
///
/// Creates an [`EchoStage`] per destination unless a stage was registered
/// with [`StubHandleFactory::with_stage`].
#[derive(Default)]
pub struct StubHandleFactory {
    stages: DashMap<String, Arc<dyn Stage>>,
    failing: HashSet<String>,
    failing_destroy: bool,
    created: AtomicUsize,
    destroyed: AtomicUsize,
}

impl StubHandleFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle creation for `key` returns an error.
    pub fn failing(mut self, key: &str) -> Self {
        self.failing.insert(key.to_string());
        self
    }

    /// Every destroy returns an error.
    pub fn failing_destroy(mut self) -> Self {
        self.failing_destroy = true;
        self
    }

    pub fn with_stage(self, key: &str, stage: Arc<dyn Stage>) -> Self {
        self.stages.insert(key.to_string(), stage);
        self
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn destroyed(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }
}

impl HandleFactory for StubHandleFactory {
    fn create_handle(&self, destination: &Destination) -> anyhow::Result<Arc<dyn Stage>> {
        if self.failing.contains(destination.key()) {
            return Err(anyhow!("no route to {}", destination));
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        let stage = match self.stages.get(destination.key()) {
            Some(stage) => Arc::clone(stage.value()),
            None => Arc::new(EchoStage {
                key: destination.key().to_string(),
            }),
        };
        Ok(stage)
    }

    fn destroy_handle(&self, _destination: &Destination, _stage: &Arc<dyn Stage>) -> anyhow::Result<()> {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
        if self.failing_destroy {
            return Err(anyhow!("destroy failed"));
        }
        Ok(())
    }
}

/// Always fails the task with the given kind.
pub struct FailingStage {
    pub kind: FailureKind,
    attempts: AtomicUsize,
}

impl FailingStage {
    pub fn new(kind: FailureKind) -> Self {
        Self {
            kind,
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Stage for FailingStage {
    fn process(&self, mut task: Task, done: Continuation) -> bool {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        task.set_failure(TaskFailure::new(
            self.kind,
            format!("attempt {} failed", attempt),
        ));
        done.done(task, true);
        true
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// Fails with `Transient` for the first `failures` attempts, then succeeds
/// and stamps the body with the attempt number.
pub struct FlakyStage {
    failures: usize,
    attempts: AtomicUsize,
}

impl FlakyStage {
    pub fn new(failures: usize) -> Self {
        Self {
            failures,
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Stage for FlakyStage {
    fn process(&self, mut task: Task, done: Continuation) -> bool {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.failures {
            task.set_failure(TaskFailure::transient(anyhow!("flaky attempt {}", attempt)));
        } else {
            task.set_header("attempt", attempt);
        }
        done.done(task, true);
        true
    }

    fn name(&self) -> &str {
        "flaky"
    }
}

/// Counts invocations and passes the task through unchanged.
pub struct CountingStage {
    pub name: String,
    count: AtomicUsize,
}

impl CountingStage {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            count: AtomicUsize::new(0),
        }
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl Stage for CountingStage {
    fn process(&self, task: Task, done: Continuation) -> bool {
        self.count.fetch_add(1, Ordering::SeqCst);
        done.done(task, true);
        true
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Completes on a spawned Tokio task after `delay`.
pub struct DelayedStage {
    pub name: String,
    pub delay: Duration,
}

impl DelayedStage {
    pub fn new(name: &str, delay: Duration) -> Self {
        Self {
            name: name.to_string(),
            delay,
        }
    }
}

impl Stage for DelayedStage {
    fn process(&self, task: Task, done: Continuation) -> bool {
        let delay = self.delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            done.done(task, false);
        });
        false
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Drops its continuation without calling it.
pub struct DroppingStage;

impl Stage for DroppingStage {
    fn process(&self, _task: Task, _done: Continuation) -> bool {
        false
    }

    fn name(&self) -> &str {
        "dropping"
    }
}

/// Fails the task and marks it rollback-only.
pub struct RollbackStage {
    attempts: AtomicUsize,
}

impl RollbackStage {
    pub fn new() -> Self {
        Self {
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Stage for RollbackStage {
    fn process(&self, mut task: Task, done: Continuation) -> bool {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        task.set_failure(TaskFailure::transient(anyhow!("constraint violated")));
        task.mark_rollback_only(RollbackScope::Route);
        done.done(task, true);
        true
    }

    fn name(&self) -> &str {
        "rollback"
    }
}

#[derive(Debug, Clone, Copy, Default)]
enum HookBehavior {
    #[default]
    Record,
    Fail,
    Panic,
}

/// Records `begin:<scope>` / `end:<scope>` events, or misbehaves on demand.
#[derive(Default)]
pub struct RecordingHooks {
    behavior: HookBehavior,
    events: Mutex<Vec<String>>,
}

impl RecordingHooks {
    pub fn failing() -> Self {
        Self {
            behavior: HookBehavior::Fail,
            ..Self::default()
        }
    }

    pub fn panicking() -> Self {
        Self {
            behavior: HookBehavior::Panic,
            ..Self::default()
        }
    }

    pub fn events(&self) -> Vec<String> {
        lock(&self.events).clone()
    }

    fn record(&self, phase: &str, scope: &ScopeMarker) -> anyhow::Result<()> {
        match self.behavior {
            HookBehavior::Record => {
                lock(&self.events).push(format!("{}:{}", phase, scope.name()));
                Ok(())
            }
            HookBehavior::Fail => Err(anyhow!("{} hook refused scope {}", phase, scope.name())),
            HookBehavior::Panic => panic!("{} hook exploded", phase),
        }
    }
}

impl ScopeHooks for RecordingHooks {
    fn on_begin(&self, scope: &ScopeMarker, _task: &Task) -> anyhow::Result<()> {
        self.record("begin", scope)
    }

    fn on_end(&self, scope: &ScopeMarker, _task: &Task) -> anyhow::Result<()> {
        self.record("end", scope)
    }
}
