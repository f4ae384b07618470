// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use super::{fold, Fold};
use crate::config::ConflictResolution;
use crate::errors::TaskFailure;
use crate::task::Task;
use crate::traits::AggregationStrategy;
use anyhow::anyhow;
use serde_json::{Map, Value};

/// Merges JSON object bodies key by key.
///
/// Keys present in more than one child are settled by the configured
/// [`ConflictResolution`]. A successful child whose body is not an object
/// fails the aggregation.
#[derive(Debug, Clone)]
pub struct JsonMerge {
    merge_arrays: bool,
    conflict_resolution: ConflictResolution,
}

impl JsonMerge {
    pub fn new(merge_arrays: bool, conflict_resolution: ConflictResolution) -> Self {
        Self {
            merge_arrays,
            conflict_resolution,
        }
    }

    /// Combine two values for the same key; `None` when they can't be merged.
    fn merge_values(&self, existing: &Value, new: &Value) -> Option<Value> {
        match (existing, new) {
            (Value::Object(existing), Value::Object(new)) => {
                let mut merged = existing.clone();
                for (key, value) in new {
                    merged.insert(key.clone(), value.clone());
                }
                Some(Value::Object(merged))
            }
            (Value::Array(existing), Value::Array(new)) if self.merge_arrays => {
                let mut merged = existing.clone();
                merged.extend(new.iter().cloned());
                Some(Value::Array(merged))
            }
            _ => None,
        }
    }

    fn merge_into(&self, merged: &mut Map<String, Value>, object: Map<String, Value>, task_id: &str) -> Result<(), TaskFailure> {
        for (key, value) in object {
            let Some(existing) = merged.get(&key) else {
                merged.insert(key, value);
                continue;
            };
            let resolved = match self.conflict_resolution {
                ConflictResolution::TakeFirst => continue,
                ConflictResolution::TakeLast => value,
                ConflictResolution::Merge => self.merge_values(existing, &value).unwrap_or(value),
                ConflictResolution::Error => {
                    return Err(TaskFailure::terminal(anyhow!(
                        "JSON merge conflict for key '{}' from task {}",
                        key,
                        task_id
                    )));
                }
            };
            merged.insert(key, resolved);
        }
        Ok(())
    }
}

fn object_body(task: &mut Task) -> Result<Map<String, Value>, TaskFailure> {
    match std::mem::take(task.body_mut()) {
        Value::Object(object) => Ok(object),
        other => Err(TaskFailure::terminal(anyhow!(
            "json_merge expects object bodies, task {} has {}",
            task.id(),
            other
        ))),
    }
}

impl AggregationStrategy for JsonMerge {
    fn aggregate(&self, accumulator: Option<Task>, next: Task) -> Result<Task, TaskFailure> {
        match fold(accumulator, next) {
            Fold::Start(task) if task.is_failed() => Ok(task),
            Fold::Start(mut task) => {
                let object = object_body(&mut task)?;
                task.set_body(Value::Object(object));
                Ok(task)
            }
            Fold::Keep(task) => Ok(task),
            Fold::Combine(mut merged, mut next) => {
                let mut target = object_body(&mut merged)?;
                let object = object_body(&mut next)?;
                self.merge_into(&mut target, object, next.id())?;
                merged.set_body(Value::Object(target));
                Ok(merged)
            }
        }
    }

    fn name(&self) -> &'static str {
        "json_merge"
    }
}
