// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use std::sync::Arc;
use tokio::runtime::Handle;

use crate::errors::ProtocolError;
use crate::task::Task;
use crate::traits::stage::{Continuation, Stage};
use crate::utils::current_runtime;

/// Async unit of work. Failures are attached to the returned task.
#[async_trait]
pub trait Processor: Send + Sync {
    async fn process(&self, task: Task) -> Task;

    fn name(&self) -> &'static str;
}

/// Adapts a [`Processor`] to the continuation protocol by spawning it on the
/// runtime that built the adapter. Always completes asynchronously.
pub struct AsyncStage {
    processor: Arc<dyn Processor>,
    runtime: Handle,
}

impl AsyncStage {
    /// Binds to the current Tokio runtime.
    pub fn new(processor: Arc<dyn Processor>) -> Result<Self, ProtocolError> {
        let runtime = current_runtime(processor.name())?;
        Ok(Self::with_runtime(processor, runtime))
    }

    pub fn with_runtime(processor: Arc<dyn Processor>, runtime: Handle) -> Self {
        Self { processor, runtime }
    }
}

impl Stage for AsyncStage {
    fn process(&self, task: Task, done: Continuation) -> bool {
        let processor = Arc::clone(&self.processor);
        self.runtime.spawn(async move {
            let task = processor.process(task).await;
            done.done(task, false);
        });
        false
    }

    fn name(&self) -> &str {
        self.processor.name()
    }
}
