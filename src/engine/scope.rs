// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::engine::gate::RunGate;
use crate::observability::messages::stage::{ScopeHookFailed, ScopeHooksSkipped};
use crate::observability::messages::StructuredLog;
use crate::task::{ScopeMarker, Task};
use crate::traits::{Continuation, ScopeHooks, Stage};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
enum Phase {
    Begin,
    End,
}

impl Phase {
    fn as_str(self) -> &'static str {
        match self {
            Phase::Begin => "begin",
            Phase::End => "end",
        }
    }
}

/// Wraps a stage in a named scope.
///
/// The scope marker sits on the task's tracker for exactly as long as the
/// delegate runs, including when the delegate finishes on another thread.
pub struct ScopeStage {
    marker: ScopeMarker,
    inner: Arc<dyn Stage>,
    hooks: Arc<[Arc<dyn ScopeHooks>]>,
    gate: RunGate,
}

impl ScopeStage {
    pub fn new(name: impl Into<Arc<str>>, inner: Arc<dyn Stage>, gate: RunGate) -> Self {
        Self {
            marker: ScopeMarker::new(name),
            inner,
            hooks: Arc::new([]),
            gate,
        }
    }

    pub fn with_hooks(mut self, hooks: Vec<Arc<dyn ScopeHooks>>) -> Self {
        self.hooks = hooks.into();
        self
    }

    pub fn marker(&self) -> &ScopeMarker {
        &self.marker
    }
}

impl Stage for ScopeStage {
    fn process(&self, mut task: Task, done: Continuation) -> bool {
        task.ensure_tracker().push_scope(self.marker.clone());
        run_hooks(&self.hooks, &self.gate, &self.marker, &task, Phase::Begin);

        let hooks = Arc::clone(&self.hooks);
        let gate = self.gate.clone();
        let marker = self.marker.clone();
        let wrapped = Continuation::new(move |mut task: Task, completed_sync| {
            if let Some(tracker) = task.tracker_mut() {
                tracker.pop_scope();
            }
            run_hooks(&hooks, &gate, &marker, &task, Phase::End);
            done.done(task, completed_sync);
        });

        self.inner.process(task, wrapped)
    }

    fn name(&self) -> &str {
        self.marker.name()
    }
}

fn run_hooks(
    hooks: &[Arc<dyn ScopeHooks>],
    gate: &RunGate,
    scope: &ScopeMarker,
    task: &Task,
    phase: Phase,
) {
    if hooks.is_empty() {
        return;
    }
    if gate.is_torn_down() {
        ScopeHooksSkipped {
            scope: scope.name(),
            phase: phase.as_str(),
        }
        .log();
        return;
    }

    for hook in hooks {
        let outcome = catch_unwind(AssertUnwindSafe(|| match phase {
            Phase::Begin => hook.on_begin(scope, task),
            Phase::End => hook.on_end(scope, task),
        }));
        let error = match outcome {
            Ok(Ok(())) => continue,
            Ok(Err(err)) => format!("{:#}", err),
            Err(_) => "hook panicked".to_string(),
        };
        ScopeHookFailed {
            scope: scope.name(),
            phase: phase.as_str(),
            error: &error,
        }
        .log();
    }
}
