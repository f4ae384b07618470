// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use super::{fold, Fold};
use crate::errors::TaskFailure;
use crate::task::Task;
use crate::traits::AggregationStrategy;

/// Keeps the first successful child and ignores the rest.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstAvailable;

impl AggregationStrategy for FirstAvailable {
    fn aggregate(&self, accumulator: Option<Task>, next: Task) -> Result<Task, TaskFailure> {
        Ok(match fold(accumulator, next) {
            Fold::Start(task) | Fold::Keep(task) => task,
            Fold::Combine(first, _) => first,
        })
    }

    fn name(&self) -> &'static str {
        "first_available"
    }
}
