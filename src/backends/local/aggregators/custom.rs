// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::errors::TaskFailure;
use crate::task::Task;
use crate::traits::AggregationStrategy;

type AggregateFn = Box<dyn Fn(Option<Task>, Task) -> Result<Task, TaskFailure> + Send + Sync>;

/// Application-supplied aggregation as a closure.
pub struct FnAggregation {
    name: &'static str,
    aggregate: AggregateFn,
}

impl FnAggregation {
    pub fn new<F>(name: &'static str, aggregate: F) -> Self
    where
        F: Fn(Option<Task>, Task) -> Result<Task, TaskFailure> + Send + Sync + 'static,
    {
        Self {
            name,
            aggregate: Box::new(aggregate),
        }
    }
}

impl AggregationStrategy for FnAggregation {
    fn aggregate(&self, accumulator: Option<Task>, next: Task) -> Result<Task, TaskFailure> {
        (self.aggregate)(accumulator, next)
    }

    fn name(&self) -> &'static str {
        self.name
    }
}
