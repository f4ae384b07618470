// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::errors::TaskFailure;
use crate::task::Task;

/// Combines fan-out child results into one task.
///
/// Called exactly once per completed child, never concurrently for the same
/// fan-out. `accumulator` is `None` for the first child.
pub trait AggregationStrategy: Send + Sync {
    fn aggregate(&self, accumulator: Option<Task>, next: Task) -> Result<Task, TaskFailure>;

    fn name(&self) -> &'static str;
}
