// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use async_trait::async_trait;

use crate::task::Task;
use crate::traits::Processor;

/// Counts characters, words and lines of a text body and stamps them as
/// headers. The body is left untouched; non-text bodies count as empty.
pub struct TokenCounterProcessor;

impl TokenCounterProcessor {
    pub const CHAR_COUNT: &'static str = "token_counter.chars";
    pub const WORD_COUNT: &'static str = "token_counter.words";
    pub const LINE_COUNT: &'static str = "token_counter.lines";

    pub fn new() -> Self {
        Self
    }
}

impl Default for TokenCounterProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Processor for TokenCounterProcessor {
    async fn process(&self, mut task: Task) -> Task {
        let input = task.body().as_str().unwrap_or_default();
        let chars = input.chars().count();
        let words = input.split_whitespace().count();
        // At least 1 line even if empty
        let lines = input.lines().count().max(1);

        task.set_header(Self::CHAR_COUNT, chars);
        task.set_header(Self::WORD_COUNT, words);
        task.set_header(Self::LINE_COUNT, lines);
        task
    }

    fn name(&self) -> &'static str {
        "token_counter"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_counts_are_stamped_as_headers() {
        let task = TokenCounterProcessor::new()
            .process(Task::new("one two\nthree"))
            .await;
        assert_eq!(task.header(TokenCounterProcessor::CHAR_COUNT), Some(&json!(13)));
        assert_eq!(task.header(TokenCounterProcessor::WORD_COUNT), Some(&json!(3)));
        assert_eq!(task.header(TokenCounterProcessor::LINE_COUNT), Some(&json!(2)));
        assert_eq!(task.body(), &json!("one two\nthree"));
    }
}
