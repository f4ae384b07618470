// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod config;
mod failure;
mod protocol;

pub use config::{ConfigError, ValidationError};
pub use failure::{FailureKind, TaskFailure};
pub use protocol::ProtocolError;
