// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Built-in fan-out aggregation strategies.
//!
//! Failed children never contribute content. A failed child becomes the
//! accumulator only while nothing has succeeded yet, so a fan-out in which
//! every child failed still reports a failure, and the first success replaces
//! it. [`UseLatest`] is the exception: it keeps the latest child and carries
//! an earlier failure forward.

pub mod concatenate;
pub mod custom;
pub mod first_available;
pub mod grouped_body;
pub mod header_merge;
pub mod json_merge;
pub mod use_latest;


pub use concatenate::Concatenate;
pub use custom::FnAggregation;
pub use first_available::FirstAvailable;
pub use grouped_body::GroupedBody;
pub use header_merge::HeaderMerge;
pub use json_merge::JsonMerge;
pub use use_latest::UseLatest;

use crate::config::AggregationConfig;
use crate::errors::ValidationError;
use crate::task::Task;
use crate::traits::AggregationStrategy;
use std::sync::Arc;

/// How a child relates to what has been aggregated so far.
pub(crate) enum Fold {
    /// `next` starts the aggregate: it is the first child, or the first
    /// success after only failures.
    Start(Task),
    /// `next` failed and is dropped; the accumulator stays.
    Keep(Task),
    /// Both succeeded and must be combined.
    Combine(Task, Task),
}

pub(crate) fn fold(accumulator: Option<Task>, next: Task) -> Fold {
    match accumulator {
        None => Fold::Start(next),
        Some(accumulator) if next.is_failed() => Fold::Keep(accumulator),
        Some(accumulator) if accumulator.is_failed() => Fold::Start(next),
        Some(accumulator) => Fold::Combine(accumulator, next),
    }
}

/// Build a strategy from its configured name.
///
/// - "use_latest" -> [`UseLatest`]
/// - "first_available" -> [`FirstAvailable`]
/// - "grouped_body" -> [`GroupedBody`]
/// - "concatenate" -> [`Concatenate`] with the configured separator
/// - "json_merge" -> [`JsonMerge`] with the configured conflict resolution
/// - "header_merge" -> [`HeaderMerge`]
pub fn from_config(config: &AggregationConfig) -> Result<Arc<dyn AggregationStrategy>, ValidationError> {
    let strategy: Arc<dyn AggregationStrategy> = match config.strategy.as_str() {
        "use_latest" => Arc::new(UseLatest),
        "first_available" => Arc::new(FirstAvailable),
        "grouped_body" => Arc::new(GroupedBody),
        "concatenate" => Arc::new(Concatenate::new(config.separator.clone())),
        "json_merge" => Arc::new(JsonMerge::new(config.merge_arrays, config.conflict_resolution)),
        "header_merge" => Arc::new(HeaderMerge),
        other => return Err(ValidationError::UnknownAggregation(other.to_string())),
    };
    Ok(strategy)
}

/// List all available strategy names
pub fn list_available_strategies() -> Vec<&'static str> {
    vec![
        "use_latest",
        "first_available",
        "grouped_body",
        "concatenate",
        "json_merge",
        "header_merge",
    ]
}
