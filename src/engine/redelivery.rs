// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Redelivery and recovery around a guarded stage.
//!
//! Each invocation carries an `Attempt` through the state machine below.
//! The attempt owns the outer continuation, so whichever path finishes the
//! task (inline, after a timer, after an asynchronous recovery send) is the
//! only one able to complete it.
//!
//! ```text
//! Attempting -> Success -> Done
//! Attempting -> Failed -> RetryScheduled -> Attempting
//!                      -> Exhausted -> Recovering -> Done
//!                                   -> Done
//! ```
//!
//! Zero-delay redeliveries loop on the current thread; any other delay
//! parks the attempt on a runtime timer and the loop resumes from the timer
//! task.

use crate::engine::gate::RunGate;
use crate::engine::resource_pool::{PooledHandle, ResourcePool};
use crate::errors::{ProtocolError, TaskFailure};
use crate::observability::messages::redelivery::{
    FailureAbsorbed, RecoveryHandoffFailed, RedeliveryExhausted, RedeliveryRejected,
    RedeliveryScheduled, RedeliveryTransition, RollbackShortCircuit, TaskRecovered,
};
use crate::observability::messages::StructuredLog;
use crate::policy::{ExceptionPolicies, HandlingIntent, RedeliveryPolicy};
use crate::task::{keys, Task};
use crate::traits::{dispatch, Continuation, Destination, Dispatched, Stage};
use crate::utils::current_runtime;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedeliveryState {
    Attempting,
    Success,
    Failed,
    RetryScheduled,
    Exhausted,
    Recovering,
    Done,
}

impl RedeliveryState {
    pub fn as_str(self) -> &'static str {
        match self {
            RedeliveryState::Attempting => "attempting",
            RedeliveryState::Success => "success",
            RedeliveryState::Failed => "failed",
            RedeliveryState::RetryScheduled => "retry_scheduled",
            RedeliveryState::Exhausted => "exhausted",
            RedeliveryState::Recovering => "recovering",
            RedeliveryState::Done => "done",
        }
    }
}

/// Where exhausted tasks go.
#[derive(Debug, Clone, Default)]
pub struct RecoveryOptions {
    /// Recovery destination, acquired from the resource pool.
    pub destination: Option<Destination>,
    /// Send the body as it was before the first attempt.
    pub use_original_body: bool,
    /// Treat a failed recovery send as handled instead of re-attaching the
    /// original failure.
    pub handle_recovery_failure: bool,
}

pub type RedeliveryHook = Arc<dyn Fn(&mut Task) + Send + Sync>;

/// Runs a guarded stage and redelivers, absorbs or recovers its failures
/// according to an [`ExceptionPolicies`] table.
pub struct RedeliveryStage {
    shared: Arc<Shared>,
}

struct Shared {
    name: String,
    inner: Arc<dyn Stage>,
    policies: ExceptionPolicies,
    recovery: RecoveryOptions,
    pool: Option<Arc<ResourcePool>>,
    gate: RunGate,
    on_redelivery: Option<RedeliveryHook>,
    runtime: Handle,
}

pub struct RedeliveryStageBuilder {
    name: String,
    inner: Arc<dyn Stage>,
    policies: ExceptionPolicies,
    recovery: RecoveryOptions,
    pool: Option<Arc<ResourcePool>>,
    gate: RunGate,
    on_redelivery: Option<RedeliveryHook>,
}

impl RedeliveryStage {
    pub fn builder(
        name: impl Into<String>,
        inner: Arc<dyn Stage>,
        policies: ExceptionPolicies,
    ) -> RedeliveryStageBuilder {
        RedeliveryStageBuilder {
            name: name.into(),
            inner,
            policies,
            recovery: RecoveryOptions::default(),
            pool: None,
            gate: RunGate::new(),
            on_redelivery: None,
        }
    }

    /// Retry under `policy` for every failure, no recovery destination.
    pub fn new(
        name: impl Into<String>,
        inner: Arc<dyn Stage>,
        policy: RedeliveryPolicy,
    ) -> Result<Self, ProtocolError> {
        Self::builder(name, inner, ExceptionPolicies::new(Arc::new(policy))).build()
    }
}

impl RedeliveryStageBuilder {
    /// Recovery sends acquire their handle from `pool`.
    pub fn recovery(mut self, recovery: RecoveryOptions, pool: Arc<ResourcePool>) -> Self {
        self.recovery = recovery;
        self.pool = Some(pool);
        self
    }

    pub fn gate(mut self, gate: RunGate) -> Self {
        self.gate = gate;
        self
    }

    /// Called on the task right before each redelivery.
    pub fn on_redelivery<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Task) + Send + Sync + 'static,
    {
        self.on_redelivery = Some(Arc::new(hook));
        self
    }

    /// Redelivery timers are spawned on the current Tokio runtime.
    pub fn build(self) -> Result<RedeliveryStage, ProtocolError> {
        let runtime = current_runtime(&self.name)?;
        Ok(self.build_on(runtime))
    }

    pub fn build_on(self, runtime: Handle) -> RedeliveryStage {
        RedeliveryStage {
            shared: Arc::new(Shared {
                name: self.name,
                inner: self.inner,
                policies: self.policies,
                recovery: self.recovery,
                pool: self.pool,
                gate: self.gate,
                on_redelivery: self.on_redelivery,
                runtime,
            }),
        }
    }
}

/// Per-invocation context. Travels with the task through every suspension.
struct Attempt {
    done: Continuation,
    redeliveries: u32,
    original_body: Option<Value>,
    /// Failure that caused the pending redelivery.
    last_failure: Option<TaskFailure>,
    state: RedeliveryState,
}

enum Settled {
    /// Run the guarded stage again right away.
    Redeliver(Task, Attempt),
    /// A timer or an asynchronous recovery send owns the attempt now.
    Parked,
    /// The outer continuation ran; `true` if synchronously.
    Finished(bool),
}

struct RecoverySend {
    attempt: Attempt,
    handle: PooledHandle,
    failure: TaskFailure,
}

impl Stage for RedeliveryStage {
    fn process(&self, task: Task, done: Continuation) -> bool {
        let attempt = Attempt {
            done,
            redeliveries: 0,
            original_body: self
                .shared
                .recovery
                .use_original_body
                .then(|| task.body().clone()),
            last_failure: None,
            state: RedeliveryState::Attempting,
        };
        drive(&self.shared, task, attempt, true)
    }

    fn name(&self) -> &str {
        &self.shared.name
    }
}

/// Attempt the guarded stage until the task settles or suspends.
fn drive(shared: &Arc<Shared>, mut task: Task, mut attempt: Attempt, sync: bool) -> bool {
    loop {
        let resume_shared = Arc::clone(shared);
        let dispatched = dispatch(shared.inner.as_ref(), task, attempt, move |task, attempt| {
            if let Settled::Redeliver(task, attempt) = settle(&resume_shared, task, attempt, false) {
                drive(&resume_shared, task, attempt, false);
            }
        });

        let (t, a) = match dispatched {
            Dispatched::Completed(t, a) => (t, a),
            Dispatched::Suspended => return false,
        };

        match settle(shared, t, a, sync) {
            Settled::Redeliver(t, a) => {
                task = t;
                attempt = a;
            }
            Settled::Parked => return false,
            Settled::Finished(sync) => return sync,
        }
    }
}

/// Decide what happens after one attempt of the guarded stage.
fn settle(shared: &Arc<Shared>, mut task: Task, mut attempt: Attempt, sync: bool) -> Settled {
    if task.is_rollback_only() {
        RollbackShortCircuit {
            stage: &shared.name,
            task_id: task.id(),
        }
        .log();
        return shared.finish(task, attempt, sync);
    }

    let resolution = match task.failure() {
        None => {
            shared.transition(&task, &mut attempt, RedeliveryState::Success);
            return shared.finish(task, attempt, sync);
        }
        Some(failure) => shared.policies.resolve(failure),
    };
    shared.transition(&task, &mut attempt, RedeliveryState::Failed);

    let intent = resolution.intent;
    let policy = Arc::clone(resolution.redelivery);
    match intent {
        HandlingIntent::Handled | HandlingIntent::Continued => {
            if let Some(failure) = task.take_failure() {
                FailureAbsorbed {
                    stage: &shared.name,
                    task_id: task.id(),
                    intent: intent.as_str(),
                    failure: &failure.to_string(),
                }
                .log();
                task.set_caught_failure(failure);
            }
            task.set_error_handled(Some(intent == HandlingIntent::Handled));
            shared.finish(task, attempt, sync)
        }
        HandlingIntent::None => shared.exhaust(task, attempt, sync),
        HandlingIntent::Retry => {
            if !shared.may_redeliver(&task, &attempt, &policy) {
                return shared.exhaust(task, attempt, sync);
            }
            let (task, attempt, delay) = shared.prepare_redelivery(task, attempt, &policy);
            if delay.is_zero() {
                return Settled::Redeliver(task, attempt);
            }
            shared.schedule(task, attempt, delay);
            Settled::Parked
        }
    }
}

impl Shared {
    fn transition(&self, task: &Task, attempt: &mut Attempt, to: RedeliveryState) {
        RedeliveryTransition {
            stage: &self.name,
            task_id: task.id(),
            from: attempt.state.as_str(),
            to: to.as_str(),
        }
        .log();
        attempt.state = to;
    }

    fn finish(&self, task: Task, mut attempt: Attempt, sync: bool) -> Settled {
        self.transition(&task, &mut attempt, RedeliveryState::Done);
        attempt.done.done(task, sync);
        Settled::Finished(sync)
    }

    fn may_redeliver(&self, task: &Task, attempt: &Attempt, policy: &RedeliveryPolicy) -> bool {
        let retryable = task.failure().is_some_and(|failure| failure.kind().is_retryable());
        if !retryable || task.is_redelivery_exhausted() {
            return false;
        }
        if !policy.permits(task, attempt.redeliveries) {
            return false;
        }
        let gate_allows = !self.gate.is_torn_down()
            && (self.gate.is_accepting() || policy.allows_redelivery_while_stopping());
        if !gate_allows {
            RedeliveryRejected {
                stage: &self.name,
                task_id: task.id(),
            }
            .log();
        }
        gate_allows
    }

    /// Clear the failure, stamp redelivery headers and run the hook.
    fn prepare_redelivery(
        &self,
        mut task: Task,
        mut attempt: Attempt,
        policy: &RedeliveryPolicy,
    ) -> (Task, Attempt, Duration) {
        attempt.redeliveries += 1;
        let redelivery = attempt.redeliveries;
        let delay = policy.delay_for(redelivery);

        attempt.last_failure = task.take_failure();
        task.set_header(keys::REDELIVERED, true);
        task.set_header(keys::REDELIVERY_COUNTER, redelivery);
        task.set_header(keys::REDELIVERY_MAX_COUNTER, policy.maximum());
        if let Some(hook) = &self.on_redelivery {
            hook(&mut task);
        }

        if policy.should_log_attempt(redelivery) {
            RedeliveryScheduled {
                stage: &self.name,
                task_id: task.id(),
                redelivery,
                maximum: policy.maximum(),
                delay,
            }
            .log();
        }
        self.transition(&task, &mut attempt, RedeliveryState::RetryScheduled);
        self.transition(&task, &mut attempt, RedeliveryState::Attempting);
        (task, attempt, delay)
    }

    fn schedule(self: &Arc<Self>, task: Task, attempt: Attempt, delay: Duration) {
        let shared = Arc::clone(self);
        self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if shared.gate.is_torn_down() {
                RedeliveryRejected {
                    stage: &shared.name,
                    task_id: task.id(),
                }
                .log();
                shared.abandon(task, attempt);
                return;
            }
            drive(&shared, task, attempt, false);
        });
    }

    /// The engine went away while a redelivery was pending: put the failure
    /// back and give up.
    fn abandon(&self, mut task: Task, mut attempt: Attempt) {
        let stopped = TaskFailure::shutdown(format!("'{}' stopped before redelivery", self.name));
        let failure = match attempt.last_failure.take() {
            Some(failure) => failure.with_suppressed(stopped),
            None => stopped,
        };
        task.set_failure(failure);
        task.set_property(keys::REDELIVERY_EXHAUSTED, true);
        self.finish(task, attempt, false);
    }

    fn exhaust(self: &Arc<Self>, mut task: Task, mut attempt: Attempt, sync: bool) -> Settled {
        self.transition(&task, &mut attempt, RedeliveryState::Exhausted);
        RedeliveryExhausted {
            stage: &self.name,
            task_id: task.id(),
            attempts: attempt.redeliveries + 1,
            failure: &task.failure().map(ToString::to_string).unwrap_or_default(),
        }
        .log();
        task.set_property(keys::REDELIVERY_EXHAUSTED, true);

        let (Some(destination), Some(pool)) = (&self.recovery.destination, &self.pool) else {
            return self.finish(task, attempt, sync);
        };
        let Some(failure) = task.take_failure() else {
            return self.finish(task, attempt, sync);
        };
        self.transition(&task, &mut attempt, RedeliveryState::Recovering);

        let handle = match pool.acquire(destination) {
            Ok(handle) => handle,
            Err(handoff) => {
                let (task, attempt) = self.recovery_failed(task, attempt, destination, failure, handoff);
                return self.finish(task, attempt, sync);
            }
        };

        if let Some(original) = attempt.original_body.clone() {
            task.set_body(original);
        }
        task.set_caught_failure(failure.clone());
        task.set_property(keys::FAILURE_DESTINATION, destination.key());

        let stage = Arc::clone(handle.stage());
        let send = RecoverySend {
            attempt,
            handle,
            failure,
        };
        let shared = Arc::clone(self);
        match dispatch(stage.as_ref(), task, send, move |task, send| {
            shared.recovered(task, send, false);
        }) {
            Dispatched::Completed(task, send) => self.recovered(task, send, sync),
            Dispatched::Suspended => Settled::Parked,
        }
    }

    fn recovered(&self, mut task: Task, send: RecoverySend, sync: bool) -> Settled {
        let RecoverySend {
            attempt,
            handle,
            failure,
        } = send;
        let destination = handle.destination().clone();
        if let Some(pool) = &self.pool {
            pool.release(handle);
        }

        match task.take_failure() {
            None => {
                TaskRecovered {
                    stage: &self.name,
                    task_id: task.id(),
                    destination: destination.key(),
                }
                .log();
                task.set_error_handled(Some(true));
                self.finish(task, attempt, sync)
            }
            Some(handoff) => {
                let (task, attempt) = self.recovery_failed(task, attempt, &destination, failure, handoff);
                self.finish(task, attempt, sync)
            }
        }
    }

    fn recovery_failed(
        &self,
        mut task: Task,
        attempt: Attempt,
        destination: &Destination,
        failure: TaskFailure,
        handoff: TaskFailure,
    ) -> (Task, Attempt) {
        RecoveryHandoffFailed {
            stage: &self.name,
            task_id: task.id(),
            destination: destination.key(),
            error: &handoff.to_string(),
        }
        .log();

        if self.recovery.handle_recovery_failure {
            task.set_caught_failure(failure.with_suppressed(handoff));
            task.set_error_handled(Some(true));
        } else {
            task.set_failure(failure.with_suppressed(handoff));
        }
        (task, attempt)
    }
}
