//! Text normalization and cheap feature signals.
//!
//! Nothing in here invokes a model. These signals feed the router, the
//! complexity analyzer and the cache key.

use serde::{Deserialize, Serialize};

/// Normalize text for cache keying: trim, case-fold, collapse whitespace.
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(|word| word.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Cheap structural signals extracted from request text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TextFeatures {
    /// Characters after trimming
    pub char_count: usize,

    /// Whitespace-separated tokens
    pub token_count: usize,

    /// Sentence-ending punctuation marks (at least 1 when non-empty)
    pub sentence_count: usize,

    /// Lines beginning with a list marker ("1.", "-", "*")
    pub list_items: usize,

    /// Fenced code blocks
    pub code_blocks: usize,

    /// Question marks
    pub questions: usize,
}

impl TextFeatures {
    pub fn extract(text: &str) -> Self {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Self::default();
        }

        let sentence_count = trimmed
            .chars()
            .filter(|c| matches!(c, '.' | '?' | '!'))
            .count()
            .max(1);

        let list_items = trimmed
            .lines()
            .map(str::trim_start)
            .filter(|line| is_list_item(line))
            .count();

        Self {
            char_count: trimmed.chars().count(),
            token_count: trimmed.split_whitespace().count(),
            sentence_count,
            list_items,
            code_blocks: trimmed.matches("```").count() / 2,
            questions: trimmed.matches('?').count(),
        }
    }

    /// True for empty or single-token input.
    pub fn is_trivial(&self, max_tokens: usize) -> bool {
        self.token_count <= max_tokens
    }
}

fn is_list_item(line: &str) -> bool {
    if line.starts_with("- ") || line.starts_with("* ") {
        return true;
    }
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    digits > 0 && matches!(line[digits..].chars().next(), Some('.') | Some(')'))
}
