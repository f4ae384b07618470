// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Immutable error handling policies: how often to redeliver, and which
//! handling intent applies to which failure.

pub mod exception;
pub mod redelivery;

pub use exception::{
    ExceptionPolicies, ExceptionPolicy, FailureMatcher, HandlingIntent, Resolution,
};
pub use redelivery::{DelayPattern, RedeliveryPolicy, RetryWhile};
