// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use serde::Deserialize;

use super::transform_text;
use crate::task::Task;
use crate::traits::Processor;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PrefixSuffixConfig {
    pub prefix: Option<String>,
    pub suffix: Option<String>,
}

/// Wraps a text body in a prefix and/or suffix.
pub struct PrefixSuffixAdderProcessor {
    config: PrefixSuffixConfig,
}

impl PrefixSuffixAdderProcessor {
    pub fn new(config: PrefixSuffixConfig) -> Self {
        Self { config }
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self::new(PrefixSuffixConfig {
            prefix: Some(prefix.into()),
            suffix: None,
        })
    }

    pub fn with_suffix(suffix: impl Into<String>) -> Self {
        Self::new(PrefixSuffixConfig {
            prefix: None,
            suffix: Some(suffix.into()),
        })
    }
}

#[async_trait]
impl Processor for PrefixSuffixAdderProcessor {
    async fn process(&self, task: Task) -> Task {
        transform_text(self.name(), task, |input| {
            format!(
                "{}{}{}",
                self.config.prefix.as_deref().unwrap_or_default(),
                input,
                self.config.suffix.as_deref().unwrap_or_default()
            )
        })
    }

    fn name(&self) -> &'static str {
        "prefix_suffix_adder"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_prefix_and_suffix() {
        let processor = PrefixSuffixAdderProcessor::new(PrefixSuffixConfig {
            prefix: Some("<".into()),
            suffix: Some(">".into()),
        });
        let task = processor.process(Task::new("x")).await;
        assert_eq!(task.body(), &json!("<x>"));

        let task = PrefixSuffixAdderProcessor::with_suffix("!")
            .process(Task::new("hi"))
            .await;
        assert_eq!(task.body(), &json!("hi!"));
    }
}
