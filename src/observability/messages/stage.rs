// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for the continuation protocol, pipelines and scopes.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};

/// A continuation was dropped without ever being invoked.
///
/// # Log Level
/// `error!` - A stage broke the exactly-once contract and the task is lost
pub struct ContinuationDropped;

impl Display for ContinuationDropped {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Continuation dropped without being invoked; the task it carried is lost"
        )
    }
}

impl StructuredLog for ContinuationDropped {
    fn log(&self) {
        tracing::error!("{}", self);
    }
}

/// A stage's return value disagreed with when it invoked its continuation.
///
/// # Log Level
/// `warn!` - Contract violation that the dispatcher tolerated
pub struct StageContractViolation<'a> {
    pub stage: &'a str,
    pub returned_sync: bool,
}

impl Display for StageContractViolation<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Stage '{}' returned completed_sync={} but its continuation state disagrees",
            self.stage, self.returned_sync
        )
    }
}

impl StructuredLog for StageContractViolation<'_> {
    fn log(&self) {
        tracing::warn!(
            stage = self.stage,
            returned_sync = self.returned_sync,
            "{}", self
        );
    }
}

/// A completion listener panicked while the lifecycle tracker drained it.
///
/// # Log Level
/// `error!` - Listener defect; later listeners still ran
pub struct CompletionListenerPanicked<'a> {
    pub task_id: &'a str,
    pub position: usize,
}

impl Display for CompletionListenerPanicked<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Completion listener #{} panicked for task {}",
            self.position, self.task_id
        )
    }
}

impl StructuredLog for CompletionListenerPanicked<'_> {
    fn log(&self) {
        tracing::error!(task_id = self.task_id, position = self.position, "{}", self);
    }
}

/// A pipeline stopped routing before its last stage.
///
/// # Log Level
/// `debug!` - Normal control flow after a failure, rollback or stop request
pub struct PipelineHalted<'a> {
    pub pipeline: &'a str,
    pub task_id: &'a str,
    pub next_stage: usize,
    pub stage_count: usize,
}

impl Display for PipelineHalted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Pipeline '{}' halted task {} before stage {} of {}",
            self.pipeline, self.task_id, self.next_stage, self.stage_count
        )
    }
}

impl StructuredLog for PipelineHalted<'_> {
    fn log(&self) {
        tracing::debug!(
            pipeline = self.pipeline,
            task_id = self.task_id,
            next_stage = self.next_stage,
            stage_count = self.stage_count,
            "{}", self
        );
    }
}

/// A scope hook returned an error or panicked.
///
/// # Log Level
/// `warn!` - Hook failures never affect routing
pub struct ScopeHookFailed<'a> {
    pub scope: &'a str,
    pub phase: &'a str,
    pub error: &'a str,
}

impl Display for ScopeHookFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Scope '{}' {} hook failed: {}",
            self.scope, self.phase, self.error
        )
    }
}

impl StructuredLog for ScopeHookFailed<'_> {
    fn log(&self) {
        tracing::warn!(
            scope = self.scope,
            phase = self.phase,
            error = self.error,
            "{}", self
        );
    }
}

/// Scope hooks were skipped because the owning gate is torn down.
///
/// # Log Level
/// `debug!`
pub struct ScopeHooksSkipped<'a> {
    pub scope: &'a str,
    pub phase: &'a str,
}

impl Display for ScopeHooksSkipped<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Skipping {} hooks for scope '{}': gate torn down",
            self.phase, self.scope
        )
    }
}

impl StructuredLog for ScopeHooksSkipped<'_> {
    fn log(&self) {
        tracing::debug!(scope = self.scope, phase = self.phase, "{}", self);
    }
}
