// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! In-process destinations, processors, resolvers and aggregation
//! strategies.

pub mod aggregators;
pub mod destinations;
pub mod factory;
pub mod processors;
pub mod resolver;

pub use destinations::*;
pub use factory::LocalHandleFactory;
pub use processors::*;
pub use resolver::{ExpressionResolver, StaticResolver};
