// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::observability::messages::stage::CompletionListenerPanicked;
use crate::observability::messages::StructuredLog;
use crate::task::Task;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Identifies a scope a task is currently executing inside.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopeMarker {
    name: Arc<str>,
}

impl ScopeMarker {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ScopeMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

pub type CompletionListener = Box<dyn FnOnce(&Task) + Send + 'static>;

/// Per top-level task bookkeeping: the stack of active scopes and the
/// listeners to run once the task leaves the engine.
#[derive(Default)]
pub struct LifecycleTracker {
    scopes: Vec<ScopeMarker>,
    listeners: Vec<CompletionListener>,
    completed: bool,
}

impl LifecycleTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_scope(&mut self, marker: ScopeMarker) {
        self.scopes.push(marker);
    }

    pub fn pop_scope(&mut self) -> Option<ScopeMarker> {
        self.scopes.pop()
    }

    pub fn current_scope(&self) -> Option<&ScopeMarker> {
        self.scopes.last()
    }

    pub fn scopes(&self) -> &[ScopeMarker] {
        &self.scopes
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub(crate) fn add_listener(&mut self, listener: CompletionListener) {
        self.listeners.push(listener);
    }

    /// Drain every registered listener in registration order.
    ///
    /// Runs at most once; later calls return 0. A panicking listener is logged
    /// and the remaining listeners still run.
    pub fn complete(&mut self, task: &Task) -> usize {
        if self.completed {
            return 0;
        }
        self.completed = true;

        let listeners = std::mem::take(&mut self.listeners);
        let count = listeners.len();
        for (position, listener) in listeners.into_iter().enumerate() {
            if catch_unwind(AssertUnwindSafe(|| listener(task))).is_err() {
                CompletionListenerPanicked {
                    task_id: task.id(),
                    position,
                }
                .log();
            }
        }
        count
    }
}

impl fmt::Debug for LifecycleTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleTracker")
            .field("scopes", &self.scopes)
            .field("listeners", &self.listeners.len())
            .field("completed", &self.completed)
            .finish()
    }
}
