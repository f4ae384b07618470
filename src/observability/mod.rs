// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Observability module for structured logging and tracing.
//!
//! Message types follow a struct-based pattern with a `Display`
//! implementation to:
//!
//! * Keep log wording out of the routing code
//! * Attach consistent structured fields to every event
//!
//! # Architecture
//!
//! * `messages::*` - one module of message types per subsystem
//! * `logging` - subscriber initialization for binaries and tests
//!
//! # Usage
//!
//! ```rust
//! use switchyard::observability::messages::pool::HandleCreationFailed;
//! use switchyard::observability::messages::StructuredLog;
//!
//! HandleCreationFailed {
//!     destination: "warehouse",
//!     error: "connection refused",
//! }
//! .log();
//! ```

pub mod logging;
pub mod messages;
