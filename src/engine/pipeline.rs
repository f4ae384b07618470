// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::observability::messages::stage::PipelineHalted;
use crate::observability::messages::StructuredLog;
use crate::task::Task;
use crate::traits::{dispatch, Continuation, Dispatched, Stage};
use std::sync::Arc;

/// Runs stages in order, checking [`Task::continue_processing`] between them.
///
/// Synchronous stages are chained in a loop on the calling thread; after an
/// asynchronous stage completes, the remaining stages run on whichever thread
/// resumed it.
pub struct Pipeline {
    name: String,
    stages: Arc<[Arc<dyn Stage>]>,
}

impl Pipeline {
    pub fn new(name: impl Into<String>, stages: Vec<Arc<dyn Stage>>) -> Self {
        Self {
            name: name.into(),
            stages: stages.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

struct Cursor {
    name: Arc<str>,
    stages: Arc<[Arc<dyn Stage>]>,
    next: usize,
    done: Continuation,
}

impl Stage for Pipeline {
    fn process(&self, task: Task, done: Continuation) -> bool {
        let cursor = Cursor {
            name: Arc::from(self.name.as_str()),
            stages: Arc::clone(&self.stages),
            next: 0,
            done,
        };
        advance(task, cursor, true)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Run stages from `cursor.next` until one suspends or the route ends.
fn advance(mut task: Task, mut cursor: Cursor, sync: bool) -> bool {
    loop {
        if cursor.next >= cursor.stages.len() {
            cursor.done.done(task, sync);
            return sync;
        }
        if cursor.next > 0 && !task.continue_processing() {
            PipelineHalted {
                pipeline: &cursor.name,
                task_id: task.id(),
                next_stage: cursor.next,
                stage_count: cursor.stages.len(),
            }
            .log();
            cursor.done.done(task, sync);
            return sync;
        }

        let stage = Arc::clone(&cursor.stages[cursor.next]);
        cursor.next += 1;
        match dispatch(stage.as_ref(), task, cursor, |task, cursor| {
            advance(task, cursor, false);
        }) {
            Dispatched::Completed(t, c) => {
                task = t;
                cursor = c;
            }
            Dispatched::Suspended => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::stub::{CountingStage, DelayedStage, FailingStage};
    use crate::errors::FailureKind;
    use crate::traits::{run, FnStage};
    use serde_json::json;
    use std::time::Duration;

    fn append(label: &'static str) -> Arc<dyn Stage> {
        Arc::new(FnStage::new(label, move |task: &mut Task| {
            let body = format!("{}{}", task.body().as_str().unwrap_or_default(), label);
            task.set_body(body);
        }))
    }

    #[test]
    fn test_sync_stages_complete_synchronously() {
        let pipeline = Pipeline::new("abc", vec![append("a"), append("b"), append("c")]);
        let (tx, rx) = std::sync::mpsc::channel();

        let sync = pipeline.process(
            Task::new(""),
            Continuation::new(move |task, sync| tx.send((task, sync)).unwrap()),
        );

        let (task, reported) = rx.recv().unwrap();
        assert!(sync && reported);
        assert_eq!(task.body(), &json!("abc"));
    }

    #[tokio::test]
    async fn test_async_stage_resumes_remaining_stages() {
        let pipeline = Pipeline::new(
            "mixed",
            vec![
                append("a"),
                Arc::new(DelayedStage::new("wait", Duration::from_millis(5))) as Arc<dyn Stage>,
                append("b"),
            ],
        );

        let task = run(&pipeline, Task::new("")).await.unwrap();
        assert_eq!(task.body(), &json!("ab"));
    }

    #[tokio::test]
    async fn test_failure_halts_route() {
        let counter = Arc::new(CountingStage::new("after"));
        let pipeline = Pipeline::new(
            "halts",
            vec![
                Arc::new(FailingStage::new(FailureKind::Terminal)) as Arc<dyn Stage>,
                counter.clone() as Arc<dyn Stage>,
            ],
        );

        let task = run(&pipeline, Task::new("x")).await.unwrap();
        assert!(task.is_failed());
        assert_eq!(counter.count(), 0);
    }

    #[tokio::test]
    async fn test_route_stop_and_continued_marker() {
        let stopper: Arc<dyn Stage> = Arc::new(FnStage::new("stop", |task: &mut Task| {
            task.stop_route()
        }));
        let counter = Arc::new(CountingStage::new("after"));
        let pipeline = Pipeline::new("stop", vec![stopper, counter.clone() as Arc<dyn Stage>]);
        run(&pipeline, Task::new("x")).await.unwrap();
        assert_eq!(counter.count(), 0);

        let continued: Arc<dyn Stage> = Arc::new(FnStage::new("continued", |task: &mut Task| {
            task.set_error_handled(Some(false))
        }));
        let pipeline = Pipeline::new("continued", vec![continued, counter.clone() as Arc<dyn Stage>]);
        run(&pipeline, Task::new("x")).await.unwrap();
        assert_eq!(counter.count(), 1);
    }

    #[test]
    fn test_long_sync_pipeline_does_not_grow_stack() {
        let stages: Vec<Arc<dyn Stage>> = (0..50_000)
            .map(|_| Arc::new(FnStage::new("noop", |_: &mut Task| {})) as Arc<dyn Stage>)
            .collect();
        let pipeline = Pipeline::new("long", stages);
        let (tx, rx) = std::sync::mpsc::channel();

        assert!(pipeline.process(
            Task::new(0),
            Continuation::new(move |task, _| tx.send(task).unwrap())
        ));
        assert!(rx.recv().is_ok());
    }
}
