// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Fan-out: send correlated copies of a task to many destinations and fold
//! the results back into the original.
//!
//! # Execution model
//!
//! Every fan-out invocation owns one `FanOutRun`, a mutex-guarded state
//! record shared by the dispatching thread, child continuations and the
//! optional timeout timer. All decisions (launch the next child, aggregate a
//! result, finish) are taken under that lock; all calls into foreign code
//! (child stages, the outer continuation) happen outside it.
//!
//! Dispatch is driven by a single trampolined `pump` loop. Whoever holds the
//! `pumping` flag launches children until the concurrency limit is reached or
//! recipients run out. A child completing synchronously inside that loop
//! only updates state and returns; the loop then picks up the next recipient.
//! Sequential fan-outs therefore never recurse, no matter how many children
//! complete inline.
//!
//! # Modes
//!
//! * **sequential** - one child at a time, in recipient order, inline on the
//!   thread that completed the previous child
//! * **parallel** - up to `workers` children spawned on the runtime;
//!   aggregation follows completion order and is serialized by the run lock
//! * **streaming** - recipients are pulled lazily from the source iterator as
//!   slots free up; otherwise all are resolved and their handles acquired
//!   before the first dispatch
//!
//! # Invariants
//!
//! * every acquired handle is released exactly once, including children that
//!   complete after a timeout and handles that were acquired but never used
//! * each completed child is aggregated at most once, and never after the
//!   run stopped or finished
//! * the outer continuation fires exactly once

use crate::config::consts::default_workers;
use crate::engine::resource_pool::{PooledHandle, ResourcePool};
use crate::errors::{ProtocolError, TaskFailure};
use crate::observability::messages::fan_out::{
    AggregationFailed, ChildAbandoned, FanOutCompleted, FanOutStarted, FanOutTimedOut,
    RecipientSkipped,
};
use crate::observability::messages::StructuredLog;
use crate::task::{keys, Task, TrackerMode};
use crate::traits::{
    AggregationStrategy, Continuation, DestinationResolver, Recipient, RecipientIter,
    RecipientSource, Stage,
};
use crate::utils::{current_runtime, lock};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct FanOutOptions {
    pub parallel: bool,
    /// Concurrent children in parallel mode.
    pub workers: usize,
    pub streaming: bool,
    pub stop_on_exception: bool,
    pub ignore_invalid: bool,
    pub timeout: Option<Duration>,
    pub tracker_mode: TrackerMode,
}

impl Default for FanOutOptions {
    fn default() -> Self {
        Self {
            parallel: false,
            workers: default_workers(),
            streaming: false,
            stop_on_exception: false,
            ignore_invalid: false,
            timeout: None,
            tracker_mode: TrackerMode::None,
        }
    }
}

impl FanOutOptions {
    fn concurrency(&self) -> usize {
        if self.parallel {
            self.workers.max(1)
        } else {
            1
        }
    }
}

pub type PrepareFn = Arc<dyn Fn(&mut Task) + Send + Sync>;

pub struct FanOutStage {
    shared: Arc<Shared>,
}

struct Shared {
    name: String,
    source: RecipientSource,
    resolver: Arc<dyn DestinationResolver>,
    pool: Arc<ResourcePool>,
    strategy: Arc<dyn AggregationStrategy>,
    options: FanOutOptions,
    on_prepare: Option<PrepareFn>,
    runtime: Handle,
}

impl FanOutStage {
    /// Parallel children and the timeout timer are spawned on the current
    /// Tokio runtime.
    pub fn new(
        name: impl Into<String>,
        source: RecipientSource,
        resolver: Arc<dyn DestinationResolver>,
        pool: Arc<ResourcePool>,
        strategy: Arc<dyn AggregationStrategy>,
        options: FanOutOptions,
    ) -> Result<Self, ProtocolError> {
        Self::with_prepare(name, source, resolver, pool, strategy, options, None)
    }

    /// Like [`FanOutStage::new`], with a callback applied to every copy right
    /// before it is dispatched.
    pub fn with_prepare(
        name: impl Into<String>,
        source: RecipientSource,
        resolver: Arc<dyn DestinationResolver>,
        pool: Arc<ResourcePool>,
        strategy: Arc<dyn AggregationStrategy>,
        options: FanOutOptions,
        on_prepare: Option<PrepareFn>,
    ) -> Result<Self, ProtocolError> {
        let name = name.into();
        let runtime = current_runtime(&name)?;
        Ok(Self::assemble(
            runtime,
            name,
            source,
            resolver,
            pool,
            strategy,
            options,
            on_prepare,
        ))
    }

    /// Like [`FanOutStage::new`], spawning on an explicit runtime.
    pub fn on_runtime(
        runtime: Handle,
        name: impl Into<String>,
        source: RecipientSource,
        resolver: Arc<dyn DestinationResolver>,
        pool: Arc<ResourcePool>,
        strategy: Arc<dyn AggregationStrategy>,
        options: FanOutOptions,
    ) -> Self {
        Self::assemble(
            runtime,
            name.into(),
            source,
            resolver,
            pool,
            strategy,
            options,
            None,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        runtime: Handle,
        name: String,
        source: RecipientSource,
        resolver: Arc<dyn DestinationResolver>,
        pool: Arc<ResourcePool>,
        strategy: Arc<dyn AggregationStrategy>,
        options: FanOutOptions,
        on_prepare: Option<PrepareFn>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                name,
                source,
                resolver,
                pool,
                strategy,
                options,
                on_prepare,
                runtime,
            }),
        }
    }

    pub fn options(&self) -> &FanOutOptions {
        &self.shared.options
    }
}

impl Stage for FanOutStage {
    fn process(&self, mut task: Task, done: Continuation) -> bool {
        let shared = &self.shared;
        FanOutStarted {
            stage: &shared.name,
            task_id: task.id(),
            parallel: shared.options.parallel,
            streaming: shared.options.streaming,
        }
        .log();

        let recipients = shared.source.recipients(&task);
        let (pending, iterator, total) = if shared.options.streaming {
            (VecDeque::new(), Some(recipients), None)
        } else {
            match shared.acquire_all(recipients, &task) {
                Ok(handles) => {
                    let total = handles.len();
                    (handles, None, Some(total))
                }
                Err(failure) => {
                    task.set_failure(failure);
                    done.done(task, true);
                    return true;
                }
            }
        };

        let run = Arc::new(FanOutRun {
            shared: Arc::clone(shared),
            state: Mutex::new(RunState {
                pending,
                iterator,
                total,
                next_index: 0,
                in_flight: 0,
                aggregated: 0,
                halted: false,
                completed: false,
                pumping: false,
                initial_call: true,
                initial_thread: thread::current().id(),
                finished_sync: false,
                accumulator: None,
                failure: None,
                original: Some(task),
                done: Some(done),
                timer: None,
            }),
        });

        if let Some(timeout) = shared.options.timeout {
            run.arm_timer(timeout);
        }
        run.pump();

        let mut state = lock(&run.state);
        state.initial_call = false;
        state.finished_sync
    }

    fn name(&self) -> &str {
        &self.shared.name
    }
}

impl Shared {
    /// Resolve and acquire every recipient up front. On a fatal error all
    /// handles acquired so far go back to the pool.
    fn acquire_all(
        &self,
        recipients: RecipientIter,
        task: &Task,
    ) -> Result<VecDeque<PooledHandle>, TaskFailure> {
        let mut handles = VecDeque::new();
        for recipient in recipients {
            match self.acquire(&recipient, task) {
                Ok(handle) => handles.push_back(handle),
                Err(failure) if self.options.ignore_invalid => {
                    self.log_skipped(&recipient, &failure);
                }
                Err(failure) => {
                    handles.into_iter().for_each(|h| self.pool.release(h));
                    return Err(failure);
                }
            }
        }
        Ok(handles)
    }

    fn acquire(&self, recipient: &Recipient, task: &Task) -> Result<PooledHandle, TaskFailure> {
        let destination = match recipient {
            Recipient::Id(id) => self.resolver.resolve(id, task)?,
            Recipient::Resolved(destination) => destination.clone(),
        };
        self.pool.acquire(&destination)
    }

    fn log_skipped(&self, recipient: &Recipient, failure: &TaskFailure) {
        RecipientSkipped {
            stage: &self.name,
            recipient: recipient.label(),
            reason: failure.message(),
        }
        .log();
    }
}

/// The next thing to dispatch: an acquired handle, or (streaming) a
/// recipient still to be resolved.
enum Next {
    Ready(PooledHandle),
    Unresolved(Recipient),
}

struct RunState {
    pending: VecDeque<PooledHandle>,
    iterator: Option<RecipientIter>,
    total: Option<usize>,
    next_index: usize,
    in_flight: usize,
    aggregated: usize,
    /// No more children may be dispatched or aggregated.
    halted: bool,
    /// The outer continuation has been taken.
    completed: bool,
    pumping: bool,
    initial_call: bool,
    initial_thread: ThreadId,
    finished_sync: bool,
    accumulator: Option<Task>,
    failure: Option<TaskFailure>,
    original: Option<Task>,
    done: Option<Continuation>,
    timer: Option<CancellationToken>,
}

enum Step {
    Idle,
    Launch {
        index: usize,
        next: Next,
        copy: Task,
        /// Known only when the recipients were materialized up front.
        last: Option<bool>,
    },
    Finish(Task, Continuation, bool),
}

struct FanOutRun {
    shared: Arc<Shared>,
    state: Mutex<RunState>,
}

impl FanOutRun {
    fn pump(self: &Arc<Self>) {
        {
            let mut state = lock(&self.state);
            if state.pumping {
                return;
            }
            state.pumping = true;
        }

        loop {
            let (step, leftovers) = self.next_step();
            self.release_all(leftovers);
            match step {
                Step::Idle => return,
                Step::Finish(task, done, sync) => {
                    done.done(task, sync);
                    return;
                }
                Step::Launch {
                    index,
                    next,
                    copy,
                    last,
                } => self.launch(index, next, copy, last),
            }
        }
    }

    /// Decide the next step under the lock. Clears `pumping` whenever the
    /// loop has nothing left to do.
    fn next_step(&self) -> (Step, Vec<PooledHandle>) {
        let mut state = lock(&self.state);
        loop {
            if state.completed {
                state.pumping = false;
                return (Step::Idle, Vec::new());
            }

            let exhausted = state.pending.is_empty() && state.iterator.is_none();
            if state.halted || exhausted {
                if state.in_flight > 0 {
                    state.pumping = false;
                    return (Step::Idle, Vec::new());
                }
                let leftovers = state.pending.drain(..).collect();
                return (self.finish(&mut state), leftovers);
            }

            if state.in_flight >= self.shared.options.concurrency() {
                state.pumping = false;
                return (Step::Idle, Vec::new());
            }

            let next = match state.pending.pop_front() {
                Some(handle) => Next::Ready(handle),
                None => {
                    let Some(mut iterator) = state.iterator.take() else {
                        continue;
                    };
                    // Recipient expressions run user code; pull without the
                    // lock so child completions are never held up by it.
                    drop(state);
                    let pulled = iterator.next();
                    state = lock(&self.state);
                    if state.completed || state.halted {
                        continue;
                    }
                    match pulled {
                        Some(recipient) => {
                            state.iterator = Some(iterator);
                            Next::Unresolved(recipient)
                        }
                        None => continue,
                    }
                }
            };

            let Some(copy) = state
                .original
                .as_ref()
                .map(|original| original.correlated_copy(self.shared.options.tracker_mode))
            else {
                state.pumping = false;
                return (Step::Idle, next.into_handle().into_iter().collect());
            };

            let index = state.next_index;
            state.next_index += 1;
            state.in_flight += 1;
            let last = state.total.map(|total| index + 1 == total);
            return (
                Step::Launch {
                    index,
                    next,
                    copy,
                    last,
                },
                Vec::new(),
            );
        }
    }

    /// Take the original and the outer continuation and build the result.
    fn finish(&self, state: &mut RunState) -> Step {
        state.completed = true;
        state.halted = true;
        state.pumping = false;
        if let Some(timer) = state.timer.take() {
            timer.cancel();
        }

        let (Some(mut original), Some(done)) = (state.original.take(), state.done.take()) else {
            return Step::Idle;
        };

        let failed = state.failure.is_some();
        if let Some(failure) = state.failure.take() {
            original.set_failure(failure);
        } else if let Some(result) = state.accumulator.take() {
            original.absorb(result);
        }

        FanOutCompleted {
            stage: &self.shared.name,
            task_id: original.id(),
            dispatched: state.next_index,
            aggregated: state.aggregated,
            failed,
        }
        .log();

        // Synchronous only when finishing on the dispatching thread before
        // `process` returned.
        let sync = state.initial_call && thread::current().id() == state.initial_thread;
        state.finished_sync = sync;
        Step::Finish(original, done, sync)
    }

    fn launch(self: &Arc<Self>, index: usize, next: Next, mut copy: Task, last: Option<bool>) {
        let handle = match next {
            Next::Ready(handle) => handle,
            Next::Unresolved(recipient) => match self.shared.acquire(&recipient, &copy) {
                Ok(handle) => handle,
                Err(failure) => {
                    self.on_invalid(&recipient, failure);
                    return;
                }
            },
        };

        copy.set_property(keys::FAN_OUT_INDEX, index);
        copy.set_property(keys::TO_DESTINATION, handle.destination().key());
        if let Some(last) = last {
            copy.set_property(keys::FAN_OUT_COMPLETE, last);
        }
        if let Some(prepare) = &self.shared.on_prepare {
            prepare(&mut copy);
        }

        let stage = Arc::clone(handle.stage());
        let run = Arc::clone(self);
        let done = Continuation::new(move |child, _| run.on_child_done(index, handle, child));

        if self.shared.options.parallel {
            self.shared.runtime.spawn(async move {
                stage.process(copy, done);
            });
        } else {
            stage.process(copy, done);
        }
    }

    fn on_invalid(&self, recipient: &Recipient, failure: TaskFailure) {
        let mut state = lock(&self.state);
        state.in_flight -= 1;
        if self.shared.options.ignore_invalid {
            drop(state);
            self.shared.log_skipped(recipient, &failure);
            return;
        }
        if !state.halted {
            state.halted = true;
            state.failure = Some(failure);
        }
    }

    fn on_child_done(self: &Arc<Self>, index: usize, handle: PooledHandle, mut child: Task) {
        self.shared.pool.release(handle);
        child.complete_lifecycle();

        {
            let mut state = lock(&self.state);
            state.in_flight -= 1;

            if state.halted {
                ChildAbandoned {
                    stage: &self.shared.name,
                    index,
                }
                .log();
            } else if child.is_failed() && self.shared.options.stop_on_exception {
                state.halted = true;
                state.failure = child.take_failure();
            } else {
                let accumulator = state.accumulator.take();
                match self.shared.strategy.aggregate(accumulator, child) {
                    Ok(result) => {
                        state.accumulator = Some(result);
                        state.aggregated += 1;
                    }
                    Err(failure) => {
                        AggregationFailed {
                            stage: &self.shared.name,
                            index,
                            error: failure.message(),
                        }
                        .log();
                        state.halted = true;
                        state.failure = Some(failure);
                    }
                }
            }
        }

        self.pump();
    }

    fn arm_timer(self: &Arc<Self>, timeout: Duration) {
        let token = CancellationToken::new();
        lock(&self.state).timer = Some(token.clone());

        let run = Arc::clone(self);
        self.shared.runtime.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(timeout) => run.on_timeout(timeout),
            }
        });
    }

    fn on_timeout(&self, timeout: Duration) {
        let (finish, leftovers) = {
            let mut state = lock(&self.state);
            if state.completed {
                return;
            }
            FanOutTimedOut {
                stage: &self.shared.name,
                task_id: state.original.as_ref().map_or("", |t| t.id()),
                timeout,
                in_flight: state.in_flight,
            }
            .log();
            state.failure = Some(TaskFailure::timeout(timeout));
            state.accumulator = None;
            let leftovers: Vec<PooledHandle> = state.pending.drain(..).collect();
            state.iterator = None;
            (self.finish(&mut state), leftovers)
        };

        self.release_all(leftovers);
        if let Step::Finish(task, done, sync) = finish {
            done.done(task, sync);
        }
    }

    fn release_all(&self, handles: Vec<PooledHandle>) {
        handles
            .into_iter()
            .for_each(|handle| self.shared.pool.release(handle));
    }
}

impl Next {
    fn into_handle(self) -> Option<PooledHandle> {
        match self {
            Next::Ready(handle) => Some(handle),
            Next::Unresolved(_) => None,
        }
    }
}
