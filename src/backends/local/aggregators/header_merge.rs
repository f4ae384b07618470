// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use super::{fold, Fold};
use crate::errors::TaskFailure;
use crate::task::Task;
use crate::traits::AggregationStrategy;

/// Keeps the body of the first successful child and merges the headers of
/// every successful child into it. Later children override earlier values.
///
/// Useful when each destination enriches the task with its own analysis
/// headers.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderMerge;

impl AggregationStrategy for HeaderMerge {
    fn aggregate(&self, accumulator: Option<Task>, next: Task) -> Result<Task, TaskFailure> {
        Ok(match fold(accumulator, next) {
            Fold::Start(task) | Fold::Keep(task) => task,
            Fold::Combine(mut primary, mut next) => {
                let headers = std::mem::take(next.headers_mut());
                primary.headers_mut().extend(headers);
                primary
            }
        })
    }

    fn name(&self) -> &'static str {
        "header_merge"
    }
}
