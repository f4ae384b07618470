// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Async text processors. Each one expects a string body and fails the task
//! with a `Terminal` failure otherwise.

pub mod change_text_case;
pub mod prefix_suffix_adder;
pub mod reverse_text;
pub mod token_counter;

pub use change_text_case::*;
pub use prefix_suffix_adder::*;
pub use reverse_text::*;
pub use token_counter::*;

use crate::errors::TaskFailure;
use crate::observability::messages::processor::{
    ProcessorExecutionCompleted, ProcessorExecutionFailed, ProcessorExecutionStarted,
};
use crate::observability::messages::StructuredLog;
use crate::task::Task;
use anyhow::anyhow;
use std::time::Instant;

/// Replace a string body with `transform(body)`, logging the execution.
pub(crate) fn transform_text<F>(processor: &str, mut task: Task, transform: F) -> Task
where
    F: FnOnce(&str) -> String,
{
    let input = task.body().as_str().map(str::to_string);
    let start_msg = ProcessorExecutionStarted {
        processor,
        task_id: task.id(),
        input_size: input.as_ref().map_or(0, String::len),
    };
    let span = start_msg.span("processor_execution");
    let _guard = span.enter();
    start_msg.log();

    let Some(input) = input else {
        let error = format!("expected a string body, found {}", task.body());
        ProcessorExecutionFailed {
            processor,
            task_id: task.id(),
            error: &error,
        }
        .log();
        task.set_failure(TaskFailure::terminal(anyhow!(error)));
        return task;
    };

    let start_time = Instant::now();
    let output = transform(&input);
    ProcessorExecutionCompleted {
        processor,
        task_id: task.id(),
        output_size: output.len(),
        duration: start_time.elapsed(),
    }
    .log();

    task.set_body(output);
    task
}
