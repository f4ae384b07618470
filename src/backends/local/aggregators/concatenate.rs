// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use super::{fold, Fold};
use crate::errors::TaskFailure;
use crate::task::Task;
use crate::traits::AggregationStrategy;
use serde_json::Value;

/// Joins the text bodies of successful children with a separator.
/// Non-text bodies are joined as their JSON rendering.
#[derive(Debug, Clone, Default)]
pub struct Concatenate {
    separator: String,
}

impl Concatenate {
    pub fn new(separator: impl Into<String>) -> Self {
        Self {
            separator: separator.into(),
        }
    }
}

fn text(body: &Value) -> String {
    match body {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

impl AggregationStrategy for Concatenate {
    fn aggregate(&self, accumulator: Option<Task>, next: Task) -> Result<Task, TaskFailure> {
        Ok(match fold(accumulator, next) {
            Fold::Start(mut task) => {
                if !task.is_failed() {
                    let body = text(task.body());
                    task.set_body(body);
                }
                task
            }
            Fold::Keep(task) => task,
            Fold::Combine(mut joined, next) => {
                let body = format!("{}{}{}", text(joined.body()), self.separator, text(next.body()));
                joined.set_body(body);
                joined
            }
        })
    }

    fn name(&self) -> &'static str {
        "concatenate"
    }
}
