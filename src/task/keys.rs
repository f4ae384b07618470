// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Well-known header and property names stamped by the engine.

/// Header: `true` once the task has been redelivered at least once.
pub const REDELIVERED: &str = "redelivered";
/// Header: number of redeliveries performed so far.
pub const REDELIVERY_COUNTER: &str = "redelivery.counter";
/// Header: configured redelivery ceiling (`-1` for unbounded).
pub const REDELIVERY_MAX_COUNTER: &str = "redelivery.max_counter";

/// Property: set when an inner redelivery stage gave up on the task.
pub const REDELIVERY_EXHAUSTED: &str = "redelivery.exhausted";
/// Property: description of the failure a handler caught.
pub const FAILURE_CAUGHT: &str = "failure.caught";
/// Property: key of the recovery destination the task was handed to.
pub const FAILURE_DESTINATION: &str = "failure.destination";

/// Property: zero-based dispatch index of a fan-out copy.
pub const FAN_OUT_INDEX: &str = "fan_out.index";
/// Property: `true` on the copy dispatched last when the recipient count is known.
pub const FAN_OUT_COMPLETE: &str = "fan_out.complete";
/// Property: destination key a fan-out copy was sent to.
pub const TO_DESTINATION: &str = "to_destination";
