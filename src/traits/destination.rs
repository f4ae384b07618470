// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::errors::TaskFailure;
use crate::task::Task;
use crate::traits::stage::Stage;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// A resolved place a task can be sent to. The key identifies the pool entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Destination {
    key: String,
}

impl Destination {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

impl From<&str> for Destination {
    fn from(key: &str) -> Self {
        Destination::new(key)
    }
}

/// One fan-out target, either still to be resolved or already resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipient {
    Id(String),
    Resolved(Destination),
}

impl Recipient {
    pub fn label(&self) -> &str {
        match self {
            Recipient::Id(id) => id,
            Recipient::Resolved(destination) => destination.key(),
        }
    }
}

impl From<&str> for Recipient {
    fn from(id: &str) -> Self {
        Recipient::Id(id.to_string())
    }
}

impl From<String> for Recipient {
    fn from(id: String) -> Self {
        Recipient::Id(id)
    }
}

impl From<Destination> for Recipient {
    fn from(destination: Destination) -> Self {
        Recipient::Resolved(destination)
    }
}

/// Turns recipient identifiers into destinations.
pub trait DestinationResolver: Send + Sync {
    fn resolve(&self, identifier: &str, task: &Task) -> Result<Destination, TaskFailure>;
}

/// Creates and destroys the stages that deliver to a destination.
pub trait HandleFactory: Send + Sync {
    fn create_handle(&self, destination: &Destination) -> anyhow::Result<Arc<dyn Stage>>;

    /// Release whatever the handle holds. Must tolerate repeated calls.
    fn destroy_handle(
        &self,
        _destination: &Destination,
        _handle: &Arc<dyn Stage>,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}

pub type RecipientIter = Box<dyn Iterator<Item = Recipient> + Send>;

type RecipientExpression = Arc<dyn Fn(&Task) -> RecipientIter + Send + Sync>;

/// Where a fan-out gets its recipients from.
#[derive(Clone)]
pub enum RecipientSource {
    /// A fixed list, the same for every task.
    Static(Vec<Recipient>),
    /// Computed from each task when the fan-out starts. The iterator is
    /// consumed lazily in streaming mode.
    Expression(RecipientExpression),
}

impl RecipientSource {
    pub fn fixed<I, R>(recipients: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<Recipient>,
    {
        RecipientSource::Static(recipients.into_iter().map(Into::into).collect())
    }

    pub fn expression<F>(f: F) -> Self
    where
        F: Fn(&Task) -> RecipientIter + Send + Sync + 'static,
    {
        RecipientSource::Expression(Arc::new(f))
    }

    /// Recipients listed in a header, either as a JSON array of strings or a
    /// single string split on `delimiter`. Blank entries are ignored.
    pub fn header(name: impl Into<String>, delimiter: impl Into<String>) -> Self {
        let name = name.into();
        let delimiter = delimiter.into();
        RecipientSource::expression(move |task| {
            let recipients: Vec<Recipient> = match task.header(&name) {
                Some(Value::String(list)) => list
                    .split(delimiter.as_str())
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .map(Recipient::from)
                    .collect(),
                Some(Value::Array(items)) => items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .map(Recipient::from)
                    .collect(),
                _ => Vec::new(),
            };
            Box::new(recipients.into_iter())
        })
    }

    pub fn recipients(&self, task: &Task) -> RecipientIter {
        match self {
            RecipientSource::Static(list) => Box::new(list.clone().into_iter()),
            RecipientSource::Expression(expression) => expression(task),
        }
    }
}

impl fmt::Debug for RecipientSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecipientSource::Static(list) => f.debug_tuple("Static").field(list).finish(),
            RecipientSource::Expression(_) => f.write_str("Expression(..)"),
        }
    }
}
