// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Centralized message types for structured logging.
//!
//! Every diagnostic and operational log line in the crate goes through one of
//! these types. Each implements `Display` for the human-readable text and
//! [`StructuredLog`] to emit the event at its documented level with the
//! message's fields attached as structured key/value pairs.
//!
//! # Organization
//!
//! * `engine` - top-level submission and shutdown events
//! * `stage` - continuation protocol, pipeline and scope events
//! * `fan_out` - recipient resolution, dispatch and aggregation events
//! * `redelivery` - retry scheduling, exhaustion and recovery events
//! * `pool` - resource pool and continuation pool events
//! * `processor` - built-in processor and local destination events
//! * `config` - configuration loading and validation events
//!
//! # Usage Pattern
//!
//! ```rust
//! use switchyard::observability::messages::engine::TaskSubmitted;
//! use switchyard::observability::messages::StructuredLog;
//!
//! let msg = TaskSubmitted {
//!     task_id: "6f1c",
//!     stage: "orders",
//! };
//!
//! msg.log();
//! ```

pub mod config;
pub mod engine;
pub mod fan_out;
pub mod pool;
pub mod processor;
pub mod redelivery;
pub mod stage;

use tracing::Span;

/// Emit a message as a structured `tracing` event.
pub trait StructuredLog {
    /// Log the message at its documented level with structured fields.
    fn log(&self);

    /// Build a span carrying the message's fields.
    ///
    /// Messages that never open a span keep the disabled default.
    fn span(&self, _name: &str) -> Span {
        Span::none()
    }
}
