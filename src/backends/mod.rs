// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Destination backends for switchyard routes.
//!
//! A backend supplies the pieces a route plugs together: a
//! [`HandleFactory`](crate::traits::HandleFactory) that turns destination keys
//! into stages, resolvers that turn recipient identifiers into destinations,
//! and aggregation strategies that fold fan-out results.
//!
//! # Available Backends
//!
//! ## Local Backend
//! In-process destinations and text processors:
//! - **Destinations**: log, record (inspectable inbox), flaky, always-failing
//! - **Processors**: case conversion, reversal, prefix/suffix, token counting
//! - **Aggregators**: use_latest, first_available, grouped_body, concatenate,
//!   json_merge, header_merge
//! - **Use Case**: demos, tests, and routes that never leave the process
//!
//! ## Stub Backend (Test-Only)
//! Stages with scripted behavior for exercising the engine:
//! - **FailingStage** / **FlakyStage**: permanent and recovering failures
//! - **DelayedStage** / **DroppingStage**: asynchronous and lost completions
//! - **RollbackStage**: failures marked rollback-only
//! - **Note**: NOT available in production builds
//!
//! # Examples
//!
//! ```rust
//! use switchyard::backends::local::LocalHandleFactory;
//! use switchyard::traits::{Destination, HandleFactory};
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let factory = LocalHandleFactory::new()?;
//! let stage = factory.create_handle(&Destination::new("record:audit"))?;
//! assert_eq!(stage.name(), "record:audit");
//! # Ok(())
//! # }
//! ```

pub mod local;
#[cfg(test)]
pub mod stub;
