// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Started,
    Stopping,
    Stopped,
}

impl GateState {
    pub fn as_str(self) -> &'static str {
        match self {
            GateState::Started => "started",
            GateState::Stopping => "stopping",
            GateState::Stopped => "stopped",
        }
    }
}

/// Shared run state of an engine or scope: started, stopping, stopped.
///
/// Transitions only move forward. Clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct RunGate {
    stopping: CancellationToken,
    stopped: CancellationToken,
}

impl RunGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> GateState {
        if self.stopped.is_cancelled() {
            GateState::Stopped
        } else if self.stopping.is_cancelled() {
            GateState::Stopping
        } else {
            GateState::Started
        }
    }

    pub fn begin_stop(&self) {
        self.stopping.cancel();
    }

    pub fn stop(&self) {
        self.stopping.cancel();
        self.stopped.cancel();
    }

    /// New work may start: not stopping and not stopped.
    pub fn is_accepting(&self) -> bool {
        self.state() == GateState::Started
    }

    pub fn is_stopping(&self) -> bool {
        self.state() == GateState::Stopping
    }

    /// Fully stopped; in-flight continuations should skip optional work.
    pub fn is_torn_down(&self) -> bool {
        self.stopped.is_cancelled()
    }

    /// Resolves once the gate reaches `Stopped`.
    pub async fn stopped(&self) {
        self.stopped.cancelled().await;
    }
}
