// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use thiserror::Error;

/// Violations of the stage/continuation contract.
///
/// These are programming defects in a stage, not task failures, so they are
/// the only errors that escape to the caller instead of riding on the task.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("stage '{stage}' dropped its continuation without invoking it")]
    ContinuationDropped { stage: String },

    #[error("'{component}' must be created inside a Tokio runtime")]
    NoRuntime { component: String },
}
