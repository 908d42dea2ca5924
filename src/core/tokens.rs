use std::sync::Arc;
use tiktoken_rs::{cl100k_base, CoreBPE};

use crate::error::{DocscribeError, Result};

/// Rough characters-per-token ratio used when no tokenizer is at hand
pub const CHARS_PER_TOKEN: usize = 4;

/// Cheap token estimate from a character count
pub fn estimate_tokens(chars: usize) -> usize {
    chars.div_ceil(CHARS_PER_TOKEN)
}

/// `cl100k_base` token counter, cheap to clone
#[derive(Clone)]
pub struct TokenCounter {
    bpe: Arc<CoreBPE>,
}

impl TokenCounter {
    pub fn new() -> Result<Self> {
        let bpe = cl100k_base().map_err(|e| DocscribeError::Tokenizer(e.to_string()))?;
        Ok(Self { bpe: Arc::new(bpe) })
    }

    pub fn count(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_rounds_up() {
        assert_eq!(estimate_tokens(0), 0);
        assert_eq!(estimate_tokens(1), 1);
        assert_eq!(estimate_tokens(400_000), 100_000);
    }

    #[test]
    fn test_counter_counts_tokens() {
        let counter = TokenCounter::new().unwrap();
        assert_eq!(counter.count(""), 0);
        assert!(counter.count("export function add(a: number, b: number) { return a + b; }") > 5);
    }
}
