// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod backends;   // destination handles, resolvers, aggregators
pub mod config;     // config + runtime builder
pub mod engine;     // routing stages and pools
pub mod errors;     // error handling
pub mod observability;
pub mod policy;     // redelivery + exception policies
pub mod task;       // the unit of in-flight work
pub mod traits;     // stage protocol and extension points
pub mod utils;
