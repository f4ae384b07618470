// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for configuration loading and validation.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};

/// A configuration file was parsed.
///
/// # Log Level
/// `info!`
pub struct ConfigLoaded<'a> {
    pub path: &'a str,
    pub format: &'a str,
}

impl Display for ConfigLoaded<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Loaded {} configuration from {}", self.format, self.path)
    }
}

impl StructuredLog for ConfigLoaded<'_> {
    fn log(&self) {
        tracing::info!(path = self.path, format = self.format, "{}", self);
    }
}

/// A configuration failed semantic validation.
///
/// # Log Level
/// `error!` - Startup cannot continue
pub struct ConfigValidationFailed<'a> {
    pub error_count: usize,
    pub errors: &'a str,
}

impl Display for ConfigValidationFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Configuration has {} validation errors: {}",
            self.error_count, self.errors
        )
    }
}

impl StructuredLog for ConfigValidationFailed<'_> {
    fn log(&self) {
        tracing::error!(
            error_count = self.error_count,
            errors = self.errors,
            "{}", self
        );
    }
}
