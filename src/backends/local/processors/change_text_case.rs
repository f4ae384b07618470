// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use serde::Deserialize;

use super::transform_text;
use crate::task::Task;
use crate::traits::Processor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextCase {
    Upper,
    Lower,
    /// First letter of every word capitalized.
    Proper,
    /// Like `Proper`, but short articles and prepositions stay lowercase
    /// unless they open the text.
    Title,
}

impl TextCase {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "upper" => Some(TextCase::Upper),
            "lower" => Some(TextCase::Lower),
            "proper" => Some(TextCase::Proper),
            "title" => Some(TextCase::Title),
            _ => None,
        }
    }

    pub fn apply(self, input: &str) -> String {
        match self {
            TextCase::Upper => input.to_uppercase(),
            TextCase::Lower => input.to_lowercase(),
            TextCase::Proper => input
                .split_whitespace()
                .map(capitalize)
                .collect::<Vec<_>>()
                .join(" "),
            TextCase::Title => input
                .split_whitespace()
                .enumerate()
                .map(|(i, word)| {
                    let lower = word.to_lowercase();
                    if i > 0 && is_minor_word(&lower) {
                        lower
                    } else {
                        capitalize(word)
                    }
                })
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        None => String::new(),
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
    }
}

fn is_minor_word(word: &str) -> bool {
    matches!(
        word,
        "a" | "an" | "the" | "and" | "or" | "but" | "in" | "on" | "at" | "to" | "for" | "of"
            | "with" | "by"
    )
}

/// Converts a text body to another case.
pub struct ChangeTextCaseProcessor {
    case: TextCase,
}

impl ChangeTextCaseProcessor {
    pub fn new(case: TextCase) -> Self {
        Self { case }
    }

    pub fn upper() -> Self {
        Self::new(TextCase::Upper)
    }

    pub fn lower() -> Self {
        Self::new(TextCase::Lower)
    }

    pub fn proper() -> Self {
        Self::new(TextCase::Proper)
    }

    pub fn title() -> Self {
        Self::new(TextCase::Title)
    }
}

#[async_trait]
impl Processor for ChangeTextCaseProcessor {
    async fn process(&self, task: Task) -> Task {
        transform_text(self.name(), task, |input| self.case.apply(input))
    }

    fn name(&self) -> &'static str {
        "change_text_case"
    }
}
