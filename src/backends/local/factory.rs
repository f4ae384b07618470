// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use anyhow::{anyhow, bail, Context};
use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::AtomicUsize;
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;

use super::destinations::*;
use super::processors::*;
use crate::errors::ProtocolError;
use crate::traits::{AsyncStage, Destination, HandleFactory, Processor, Stage};
use crate::utils::{current_runtime, lock};

/// Creates in-process handles from destination keys of the form
/// `kind` or `kind:argument`.
///
/// Destinations (complete synchronously):
/// - `log:<name>` -> [`LogDestination`]
/// - `record:<name>` -> [`RecordingDestination`], inbox readable via [`LocalHandleFactory::recorded`]
/// - `flaky:<n>` -> [`FlakyDestination`] failing the first `n` deliveries
/// - `fail` / `fail:<reason>` -> [`RejectingDestination`]
///
/// Processors (complete asynchronously on the factory's runtime):
/// - `upper`, `lower`, `proper`, `title` -> [`ChangeTextCaseProcessor`]
/// - `reverse` -> [`ReverseTextProcessor`]
/// - `token_counter` -> [`TokenCounterProcessor`]
/// - `prefix:<text>`, `suffix:<text>` -> [`PrefixSuffixAdderProcessor`]
///
/// State that must survive pooling (inboxes, flaky attempt counters) is kept
/// per key in the factory, so every handle for a key sees the same state.
pub struct LocalHandleFactory {
    runtime: Handle,
    inboxes: DashMap<String, Arc<Mutex<Vec<Value>>>>,
    attempts: DashMap<String, Arc<AtomicUsize>>,
}

impl LocalHandleFactory {
    /// Processor handles run on the current Tokio runtime.
    pub fn new() -> Result<Self, ProtocolError> {
        Ok(Self::with_runtime(current_runtime("local handle factory")?))
    }

    pub fn with_runtime(runtime: Handle) -> Self {
        Self {
            runtime,
            inboxes: DashMap::new(),
            attempts: DashMap::new(),
        }
    }

    /// Bodies delivered so far to a `record:` destination.
    pub fn recorded(&self, key: &str) -> Vec<Value> {
        self.inboxes
            .get(key)
            .map(|inbox| lock(inbox.value()).clone())
            .unwrap_or_default()
    }

    /// List all available destination kinds
    pub fn list_available_kinds() -> Vec<&'static str> {
        vec![
            "log", "record", "flaky", "fail", "upper", "lower", "proper", "title", "reverse",
            "token_counter", "prefix", "suffix",
        ]
    }

    /// Check if a key names an available kind
    pub fn is_kind_available(key: &str) -> bool {
        let kind = key.split_once(':').map_or(key, |(kind, _)| kind);
        Self::list_available_kinds().contains(&kind)
    }

    fn processor(&self, processor: impl Processor + 'static) -> Arc<dyn Stage> {
        Arc::new(AsyncStage::with_runtime(
            Arc::new(processor),
            self.runtime.clone(),
        ))
    }
}

impl HandleFactory for LocalHandleFactory {
    fn create_handle(&self, destination: &Destination) -> anyhow::Result<Arc<dyn Stage>> {
        let key = destination.key();
        let (kind, argument) = match key.split_once(':') {
            Some((kind, argument)) => (kind, Some(argument)),
            None => (key, None),
        };

        let stage: Arc<dyn Stage> = match (kind, argument) {
            ("log", _) => Arc::new(LogDestination::new(key)),
            ("record", _) => {
                let inbox = self.inboxes.entry(key.to_string()).or_default().clone();
                Arc::new(RecordingDestination::new(key, inbox))
            }
            ("flaky", argument) => {
                let failures = argument
                    .unwrap_or("1")
                    .parse::<usize>()
                    .with_context(|| format!("invalid failure count in '{}'", key))?;
                let attempts = self.attempts.entry(key.to_string()).or_default().clone();
                Arc::new(FlakyDestination::new(key, failures, attempts))
            }
            ("fail", reason) => Arc::new(RejectingDestination::new(
                key,
                reason.unwrap_or("destination always fails"),
            )),
            ("prefix", Some(prefix)) => self.processor(PrefixSuffixAdderProcessor::with_prefix(prefix)),
            ("suffix", Some(suffix)) => self.processor(PrefixSuffixAdderProcessor::with_suffix(suffix)),
            ("prefix" | "suffix", None) => bail!("'{}' needs an argument, e.g. '{}:text'", key, key),
            ("reverse", None) => self.processor(ReverseTextProcessor::new()),
            ("token_counter", None) => self.processor(TokenCounterProcessor::new()),
            (case, None) => match TextCase::parse(case) {
                Some(case) => self.processor(ChangeTextCaseProcessor::new(case)),
                None => return Err(anyhow!("unknown local destination '{}'", key)),
            },
            _ => return Err(anyhow!("unknown local destination '{}'", key)),
        };
        Ok(stage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::FailureKind;
    use crate::task::Task;
    use crate::traits::run;
    use serde_json::json;

    async fn deliver(factory: &LocalHandleFactory, key: &str, body: &str) -> Task {
        let stage = factory.create_handle(&Destination::new(key)).unwrap();
        run(stage.as_ref(), Task::new(body)).await.unwrap()
    }

    #[tokio::test]
    async fn test_processor_kinds() {
        let factory = LocalHandleFactory::new().unwrap();
        let test_cases = vec![
            ("upper", "hello", "HELLO"),
            ("lower", "HELLO", "hello"),
            ("title", "the quick brown fox", "The Quick Brown Fox"),
            ("reverse", "hello", "olleh"),
            ("prefix:>> ", "hi", ">> hi"),
            ("suffix:!", "hi", "hi!"),
        ];

        for (key, input, expected) in test_cases {
            let task = deliver(&factory, key, input).await;
            assert_eq!(task.body(), &json!(expected), "Failed for key: {}", key);
        }
    }

    #[test]
    fn test_new_outside_runtime_is_an_error() {
        assert!(matches!(
            LocalHandleFactory::new(),
            Err(ProtocolError::NoRuntime { .. })
        ));
    }

    #[tokio::test]
    async fn test_record_handles_share_inbox_per_key() {
        let factory = LocalHandleFactory::new().unwrap();
        deliver(&factory, "record:audit", "a").await;
        deliver(&factory, "record:audit", "b").await;
        deliver(&factory, "record:other", "c").await;

        assert_eq!(factory.recorded("record:audit"), vec![json!("a"), json!("b")]);
        assert_eq!(factory.recorded("record:other"), vec![json!("c")]);
        assert!(factory.recorded("record:none").is_empty());
    }

    #[tokio::test]
    async fn test_flaky_attempts_survive_new_handles() {
        let factory = LocalHandleFactory::new().unwrap();
        let first = deliver(&factory, "flaky:1", "x").await;
        assert_eq!(first.failure().map(|f| f.kind()), Some(FailureKind::Transient));
        let second = deliver(&factory, "flaky:1", "x").await;
        assert!(!second.is_failed());
    }

    #[tokio::test]
    async fn test_unknown_and_malformed_keys_fail() {
        let factory = LocalHandleFactory::new().unwrap();
        for key in ["nope", "prefix", "flaky:many", "reverse:x"] {
            assert!(
                factory.create_handle(&Destination::new(key)).is_err(),
                "expected error for {}",
                key
            );
        }
        assert!(LocalHandleFactory::is_kind_available("log:audit"));
        assert!(!LocalHandleFactory::is_kind_available("nope"));
    }
}
