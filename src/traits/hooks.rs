// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::task::{ScopeMarker, Task};

/// Callbacks around a scope, typically supplied by an observability layer.
///
/// Hooks must not block. Errors and panics are logged and never affect
/// routing.
pub trait ScopeHooks: Send + Sync {
    fn on_begin(&self, _scope: &ScopeMarker, _task: &Task) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_end(&self, _scope: &ScopeMarker, _task: &Task) -> anyhow::Result<()> {
        Ok(())
    }
}
