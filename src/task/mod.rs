// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The unit of in-flight work.
//!
//! A [`Task`] moves by value through stage continuations. Stages mutate it in
//! place (body, headers, properties) and signal problems by attaching a
//! [`TaskFailure`] rather than returning errors. The engine attaches a
//! [`LifecycleTracker`] to every top-level task; fan-out copies either get an
//! isolated tracker or none at all, never the original's.

pub mod keys;
pub mod tracker;

pub use tracker::{LifecycleTracker, ScopeMarker};

use crate::errors::TaskFailure;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// How far a rollback request reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackScope {
    /// Roll back the whole route.
    Route,
    /// Roll back only the innermost transactional scope.
    Scope,
}

/// Terminal state of a task, with rollback dominating failure and failure
/// dominating success.
#[derive(Debug, Clone, Copy)]
pub enum Outcome<'a> {
    Success,
    Failed(&'a TaskFailure),
    RolledBack(RollbackScope),
}

impl Outcome<'_> {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Failed(_) => "failed",
            Outcome::RolledBack(_) => "rolled_back",
        }
    }
}

/// Whether a correlated copy gets its own lifecycle tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerMode {
    /// Fresh tracker, completed when the copy finishes.
    Isolated,
    /// No tracker up front. Registering a listener on the copy attaches one
    /// lazily, and the fan-out completes it like an isolated tracker.
    #[default]
    None,
}

#[derive(Debug)]
pub struct Task {
    id: String,
    correlation_id: Option<String>,
    body: Value,
    headers: HashMap<String, Value>,
    properties: HashMap<String, Value>,
    failure: Option<TaskFailure>,
    caught_failure: Option<TaskFailure>,
    rollback: Option<RollbackScope>,
    route_stop: bool,
    error_handled: Option<bool>,
    tracker: Option<LifecycleTracker>,
}

impl Task {
    pub fn new(body: impl Into<Value>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            correlation_id: None,
            body: body.into(),
            headers: HashMap::new(),
            properties: HashMap::new(),
            failure: None,
            caught_failure: None,
            rollback: None,
            route_stop: false,
            error_handled: None,
            tracker: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut Value {
        &mut self.body
    }

    pub fn set_body(&mut self, body: impl Into<Value>) {
        self.body = body.into();
    }

    pub fn header(&self, name: &str) -> Option<&Value> {
        self.headers.get(name)
    }

    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.headers.insert(name.into(), value.into());
    }

    pub fn remove_header(&mut self, name: &str) -> Option<Value> {
        self.headers.remove(name)
    }

    pub fn headers(&self) -> &HashMap<String, Value> {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HashMap<String, Value> {
        &mut self.headers
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    pub fn set_property(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.properties.insert(name.into(), value.into());
    }

    pub fn remove_property(&mut self, name: &str) -> Option<Value> {
        self.properties.remove(name)
    }

    pub fn properties(&self) -> &HashMap<String, Value> {
        &self.properties
    }

    pub fn failure(&self) -> Option<&TaskFailure> {
        self.failure.as_ref()
    }

    /// Attach a failure. Replaces any failure already carried.
    pub fn set_failure(&mut self, failure: TaskFailure) {
        self.failure = Some(failure);
    }

    pub fn take_failure(&mut self) -> Option<TaskFailure> {
        self.failure.take()
    }

    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }

    /// The failure an error handler caught and cleared, if any.
    pub fn caught_failure(&self) -> Option<&TaskFailure> {
        self.caught_failure.as_ref()
    }

    pub fn set_caught_failure(&mut self, failure: TaskFailure) {
        self.properties.insert(
            keys::FAILURE_CAUGHT.to_string(),
            Value::String(failure.to_string()),
        );
        self.caught_failure = Some(failure);
    }

    pub fn mark_rollback_only(&mut self, scope: RollbackScope) {
        self.rollback = Some(scope);
    }

    pub fn rollback(&self) -> Option<RollbackScope> {
        self.rollback
    }

    pub fn is_rollback_only(&self) -> bool {
        self.rollback.is_some()
    }

    /// Ask the enclosing pipeline to stop routing after the current stage.
    pub fn stop_route(&mut self) {
        self.route_stop = true;
    }

    pub fn is_route_stopped(&self) -> bool {
        self.route_stop
    }

    /// `Some(true)` when a handler absorbed the failure and routing must stop,
    /// `Some(false)` when it absorbed the failure and routing continues.
    pub fn error_handled(&self) -> Option<bool> {
        self.error_handled
    }

    pub fn set_error_handled(&mut self, handled: Option<bool>) {
        self.error_handled = handled;
    }

    pub fn is_redelivery_exhausted(&self) -> bool {
        self.properties
            .get(keys::REDELIVERY_EXHAUSTED)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Cooperative checkpoint evaluated between pipeline stages.
    pub fn continue_processing(&self) -> bool {
        !self.is_failed()
            && !self.is_rollback_only()
            && !self.route_stop
            && self.error_handled != Some(true)
    }

    pub fn outcome(&self) -> Outcome<'_> {
        if let Some(scope) = self.rollback {
            Outcome::RolledBack(scope)
        } else if let Some(failure) = &self.failure {
            Outcome::Failed(failure)
        } else {
            Outcome::Success
        }
    }

    pub fn tracker(&self) -> Option<&LifecycleTracker> {
        self.tracker.as_ref()
    }

    pub fn tracker_mut(&mut self) -> Option<&mut LifecycleTracker> {
        self.tracker.as_mut()
    }

    /// Return the task's tracker, attaching a fresh one if it has none.
    pub fn ensure_tracker(&mut self) -> &mut LifecycleTracker {
        self.tracker.get_or_insert_with(LifecycleTracker::new)
    }

    /// Register a listener to run when the task's lifecycle completes.
    ///
    /// If the lifecycle already completed the listener runs immediately.
    pub fn on_completion<F>(&mut self, listener: F)
    where
        F: FnOnce(&Task) + Send + 'static,
    {
        if self.tracker.as_ref().is_some_and(LifecycleTracker::is_completed) {
            listener(self);
            return;
        }
        self.ensure_tracker().add_listener(Box::new(listener));
    }

    /// Drain the tracker's completion listeners. Returns how many ran.
    pub fn complete_lifecycle(&mut self) -> usize {
        match self.tracker.take() {
            Some(mut tracker) => {
                let ran = tracker.complete(self);
                self.tracker = Some(tracker);
                ran
            }
            None => 0,
        }
    }

    /// Deep copy for a fan-out branch with a new id, correlated to this task.
    ///
    /// The copy never shares this task's tracker. Scope and handling markers
    /// are not copied.
    pub fn correlated_copy(&self, mode: TrackerMode) -> Task {
        Task {
            id: Uuid::new_v4().to_string(),
            correlation_id: Some(self.id.clone()),
            body: self.body.clone(),
            headers: self.headers.clone(),
            properties: self.properties.clone(),
            failure: self.failure.clone(),
            caught_failure: None,
            rollback: None,
            route_stop: false,
            error_handled: None,
            tracker: match mode {
                TrackerMode::Isolated => Some(LifecycleTracker::new()),
                TrackerMode::None => None,
            },
        }
    }

    /// Take over the results of an aggregated task: body, headers,
    /// properties, failure, rollback and route-stop markers.
    pub(crate) fn absorb(&mut self, result: Task) {
        self.body = result.body;
        self.headers = result.headers;
        self.properties.extend(result.properties);
        if let Some(failure) = result.failure {
            self.failure = Some(failure);
        }
        if result.rollback.is_some() {
            self.rollback = result.rollback;
        }
        self.route_stop |= result.route_stop;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::FailureKind;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_outcome_precedence() {
        let mut task = Task::new("order-1");
        assert!(matches!(task.outcome(), Outcome::Success));

        task.set_failure(TaskFailure::new(FailureKind::Transient, "down"));
        assert!(matches!(task.outcome(), Outcome::Failed(_)));

        task.mark_rollback_only(RollbackScope::Scope);
        assert!(matches!(
            task.outcome(),
            Outcome::RolledBack(RollbackScope::Scope)
        ));
    }

    #[test]
    fn test_continue_processing_checkpoint() {
        let mut task = Task::new(json!({"sku": 7}));
        assert!(task.continue_processing());

        task.set_error_handled(Some(false));
        assert!(task.continue_processing());

        task.set_error_handled(Some(true));
        assert!(!task.continue_processing());

        let mut stopped = Task::new("x");
        stopped.stop_route();
        assert!(!stopped.continue_processing());
    }

    #[test]
    fn test_correlated_copy_is_independent() {
        let mut original = Task::new("payload").with_header("priority", "high");
        original.on_completion(|_| {});

        let mut copy = original.correlated_copy(TrackerMode::None);
        copy.set_body("changed");
        copy.set_header("priority", "low");

        assert_ne!(copy.id(), original.id());
        assert_eq!(copy.correlation_id(), Some(original.id()));
        assert!(copy.tracker().is_none());
        assert_eq!(original.body(), &json!("payload"));
        assert_eq!(original.header("priority"), Some(&json!("high")));

        let isolated = original.correlated_copy(TrackerMode::Isolated);
        assert_eq!(isolated.tracker().map(|t| t.listener_count()), Some(0));
    }

    #[test]
    fn test_untracked_copy_attaches_tracker_on_first_listener() {
        let original = Task::new("payload");
        let mut copy = original.correlated_copy(TrackerMode::None);
        assert!(copy.tracker().is_none());

        let ran = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&ran);
        copy.on_completion(move |_| *flag.lock().unwrap() = true);
        assert_eq!(copy.tracker().map(|t| t.listener_count()), Some(1));

        assert_eq!(copy.complete_lifecycle(), 1);
        assert!(*ran.lock().unwrap());
    }

    #[test]
    fn test_completion_listeners_run_once_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut task = Task::new("x");

        for label in ["first", "second", "third"] {
            let seen = Arc::clone(&seen);
            task.on_completion(move |_| seen.lock().unwrap().push(label));
        }

        assert_eq!(task.complete_lifecycle(), 3);
        assert_eq!(task.complete_lifecycle(), 0);
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_panicking_listener_does_not_block_later_ones() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut task = Task::new("x");

        task.on_completion(|_| panic!("listener blew up"));
        let later = Arc::clone(&seen);
        task.on_completion(move |t| later.lock().unwrap().push(t.id().to_string()));

        task.complete_lifecycle();
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_listener_after_completion_runs_immediately() {
        let mut task = Task::new("x");
        task.ensure_tracker();
        task.complete_lifecycle();

        let ran = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&ran);
        task.on_completion(move |_| *flag.lock().unwrap() = true);
        assert!(*ran.lock().unwrap());
    }

    #[test]
    fn test_caught_failure_is_visible_as_property() {
        let mut task = Task::new("x");
        task.set_caught_failure(TaskFailure::new(FailureKind::Terminal, "bad data"));

        assert_eq!(
            task.property(keys::FAILURE_CAUGHT),
            Some(&json!("terminal failure: bad data"))
        );
        assert!(!task.is_failed());
    }
}
