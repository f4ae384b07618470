// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod loader;
mod runtime;
mod validation;

pub mod consts;

pub use loader::{
    load_and_validate_config, load_config, AggregationConfig, ConflictResolution,
    ContinuationPoolConfig, EngineConfig, ExceptionPolicyConfig, FanOutConfig, RecoveryConfig,
    RedeliveryConfig, ResourcePoolConfig, SwitchyardConfig,
};
pub use runtime::{RuntimeBuilder, SwitchyardRuntime};
pub use validation::validate_config;
