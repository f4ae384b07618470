// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod aggregation;
pub mod destination;
pub mod hooks;
pub mod processor;
pub mod stage;

pub use aggregation::AggregationStrategy;
pub use destination::{
    Destination, DestinationResolver, HandleFactory, Recipient, RecipientIter, RecipientSource,
};
pub use hooks::ScopeHooks;
pub use processor::{AsyncStage, Processor};
pub use stage::{dispatch, run, Continuation, Dispatched, FnStage, Stage};
