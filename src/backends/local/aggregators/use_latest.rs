// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::errors::TaskFailure;
use crate::task::Task;
use crate::traits::AggregationStrategy;

/// The latest child wins. A failure seen earlier is carried onto it, so a
/// failed child is never hidden by a later success.
#[derive(Debug, Clone, Copy, Default)]
pub struct UseLatest;

impl AggregationStrategy for UseLatest {
    fn aggregate(&self, accumulator: Option<Task>, mut next: Task) -> Result<Task, TaskFailure> {
        if let Some(mut previous) = accumulator {
            if !next.is_failed() {
                if let Some(failure) = previous.take_failure() {
                    next.set_failure(failure);
                }
            }
        }
        Ok(next)
    }

    fn name(&self) -> &'static str {
        "use_latest"
    }
}
