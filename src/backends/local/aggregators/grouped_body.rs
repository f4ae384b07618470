// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use super::{fold, Fold};
use crate::errors::TaskFailure;
use crate::task::Task;
use crate::traits::AggregationStrategy;
use serde_json::Value;

/// Collects the bodies of successful children into a JSON array in
/// aggregation order. Headers come from the latest child.
#[derive(Debug, Clone, Copy, Default)]
pub struct GroupedBody;

impl AggregationStrategy for GroupedBody {
    fn aggregate(&self, accumulator: Option<Task>, next: Task) -> Result<Task, TaskFailure> {
        Ok(match fold(accumulator, next) {
            Fold::Start(mut task) => {
                if !task.is_failed() {
                    let body = task.body().clone();
                    task.set_body(Value::Array(vec![body]));
                }
                task
            }
            Fold::Keep(task) => task,
            Fold::Combine(mut group, mut next) => {
                let body = std::mem::take(next.body_mut());
                if let Value::Array(items) = group.body_mut() {
                    items.push(body);
                }
                let group_body = std::mem::take(group.body_mut());
                next.set_body(group_body);
                next
            }
        })
    }

    fn name(&self) -> &'static str {
        "grouped_body"
    }
}
