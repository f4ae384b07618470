// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::errors::TaskFailure;
use crate::task::Task;
use crate::traits::{Destination, DestinationResolver};
use anyhow::anyhow;
use std::collections::HashMap;
use std::sync::Arc;

/// Resolves identifiers through a fixed registry.
///
/// With `passthrough` enabled, identifiers missing from the registry resolve
/// to a destination with the identifier as its key.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    routes: HashMap<String, Destination>,
    passthrough: bool,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every identifier is its own destination key.
    pub fn passthrough() -> Self {
        Self {
            routes: HashMap::new(),
            passthrough: true,
        }
    }

    pub fn route(mut self, identifier: impl Into<String>, destination: impl Into<Destination>) -> Self {
        self.routes.insert(identifier.into(), destination.into());
        self
    }
}

impl DestinationResolver for StaticResolver {
    fn resolve(&self, identifier: &str, _task: &Task) -> Result<Destination, TaskFailure> {
        match self.routes.get(identifier) {
            Some(destination) => Ok(destination.clone()),
            None if self.passthrough && !identifier.trim().is_empty() => {
                Ok(Destination::new(identifier))
            }
            None => Err(TaskFailure::terminal(anyhow!(
                "no destination registered for '{}'",
                identifier
            ))),
        }
    }
}

type ResolveFn = Arc<dyn Fn(&str, &Task) -> Option<Destination> + Send + Sync>;

/// Resolves identifiers with a closure that may look at the task.
#[derive(Clone)]
pub struct ExpressionResolver {
    resolve: ResolveFn,
}

impl ExpressionResolver {
    pub fn new<F>(resolve: F) -> Self
    where
        F: Fn(&str, &Task) -> Option<Destination> + Send + Sync + 'static,
    {
        Self {
            resolve: Arc::new(resolve),
        }
    }
}

impl DestinationResolver for ExpressionResolver {
    fn resolve(&self, identifier: &str, task: &Task) -> Result<Destination, TaskFailure> {
        (self.resolve)(identifier, task).ok_or_else(|| {
            TaskFailure::terminal(anyhow!("expression could not resolve '{}'", identifier))
        })
    }
}
