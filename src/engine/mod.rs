// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Routing engine: the composing stages and the shared runtime pieces they
//! use.
//!
//! * [`Pipeline`] - ordered stages with cooperative checkpoints
//! * [`FanOutStage`] - correlated copies to many destinations, aggregated
//! * [`RedeliveryStage`] - retry, absorb or recover failures of a guarded stage
//! * [`ScopeStage`] - scope markers and hooks around a delegate
//! * [`HandoffStage`] - continue on a [`ContinuationPool`] worker
//! * [`ResourcePool`] - keyed destination handles shared by all branches
//! * [`Engine`] - submission, completion listeners and shutdown

pub mod continuation_pool;
pub mod fan_out;
pub mod gate;
pub mod pipeline;
pub mod redelivery;
pub mod resource_pool;
pub mod runtime;
pub mod scope;
#[cfg(test)]
mod integration_tests;

pub use continuation_pool::{ContinuationPool, HandoffStage, RejectionPolicy};
pub use fan_out::{FanOutOptions, FanOutStage, PrepareFn};
pub use gate::{GateState, RunGate};
pub use pipeline::Pipeline;
pub use redelivery::{
    RecoveryOptions, RedeliveryHook, RedeliveryStage, RedeliveryStageBuilder, RedeliveryState,
};
pub use resource_pool::{PoolStats, PooledHandle, ResourcePool};
pub use runtime::Engine;
pub use scope::ScopeStage;
