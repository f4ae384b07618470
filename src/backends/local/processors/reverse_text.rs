// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use async_trait::async_trait;

use super::transform_text;
use crate::task::Task;
use crate::traits::Processor;

/// Reverses a text body character by character.
pub struct ReverseTextProcessor;

impl ReverseTextProcessor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ReverseTextProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Processor for ReverseTextProcessor {
    async fn process(&self, task: Task) -> Task {
        transform_text(self.name(), task, |input| input.chars().rev().collect())
    }

    fn name(&self) -> &'static str {
        "reverse_text"
    }
}
