//! Token estimation for text and structured messages.

use serde::Serialize;
use std::sync::Arc;

/// An exact tokenizer plugged into the counter.
///
/// Returning `None` makes the counter fall back to its heuristic.
pub trait Tokenizer: Send + Sync {
    /// Count the tokens in `text`.
    fn count(&self, text: &str) -> Option<usize>;
}

/// Estimates how many model tokens a text or structure costs.
#[derive(Clone, Default)]
pub struct TokenCounter {
    tokenizer: Option<Arc<dyn Tokenizer>>,
}

impl TokenCounter {
    /// Create a heuristic-only counter.
    pub fn new() -> Self {
        Self { tokenizer: None }
    }

    /// Create a counter backed by an exact tokenizer.
    pub fn with_tokenizer(tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self {
            tokenizer: Some(tokenizer),
        }
    }

    /// Whether counts come from an exact tokenizer.
    pub fn is_exact(&self) -> bool {
        self.tokenizer.is_some()
    }

    /// Count tokens in a text.
    pub fn count_text(&self, text: &str) -> usize {
        self.tokenizer
            .as_ref()
            .and_then(|t| t.count(text))
            .unwrap_or_else(|| estimate_tokens(text))
    }

    /// Count tokens in a structure rendered as compact JSON.
    pub fn count_structured<T: Serialize + ?Sized>(&self, value: &T) -> usize {
        let canonical = serde_json::to_string(value).unwrap_or_default();
        self.count_text(&canonical)
    }

    /// Percentage saved going from `original` to `compressed` tokens.
    pub fn reduction(original: usize, compressed: usize) -> f64 {
        if original == 0 {
            return 0.0;
        }
        (original as f64 - compressed as f64) / original as f64 * 100.0
    }
}

impl std::fmt::Debug for TokenCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCounter")
            .field("exact", &self.is_exact())
            .finish()
    }
}

/// Heuristic token estimate.
///
/// Geometric mean of `0.75 * words` and `chars / 4`, rounded and floored at
/// one token. Empty text costs nothing.
pub fn estimate_tokens(text: &str) -> usize {
    let chars = text.chars().count();
    if chars == 0 {
        return 0;
    }
    let words = text.split_whitespace().count();
    let by_words = words as f64 * 0.75;
    let by_chars = chars as f64 / 4.0;
    ((by_words * by_chars).sqrt().round() as usize).max(1)
}
