//! Recursive semantic splitting with a sliding token overlap.
//!
//! - Boundaries come from `semchunk-rs`, which recursively splits on paragraph, sentence, and
//!   word separators until every piece fits the token budget.
//! - Overlap: after splitting, the tail of the previous chunk (up to `overlap` tokens) is
//!   prepended to each chunk so spans around boundaries stay retrievable. The combined chunk is
//!   trimmed from the front until it fits the budget again.
//! - Token counting: a `tiktoken` encoding when one is configured, whitespace words otherwise.

use std::sync::Arc;

use anyhow::Error as TokenizerError;
use semchunk_rs::Chunker;
use tiktoken_rs::{CoreBPE, cl100k_base, get_bpe_from_model, o200k_base, p50k_base, r50k_base};

use super::ChunkingError;

/// Shared token counting function.
pub type TokenCounter = Arc<dyn Fn(&str) -> usize + Send + Sync>;

/// Splits a document's text into ordered chunks.
pub trait TextSplitter: Send + Sync {
    /// Split `text`; the same input always yields the same sequence.
    fn split(&self, text: &str) -> Vec<String>;
}

/// Budgeted recursive splitter (500/100 by default).
pub struct RecursiveSplitter {
    chunk_size: usize,
    overlap: usize,
    token_counter: TokenCounter,
}

impl RecursiveSplitter {
    /// Build a splitter with an explicit token counter.
    pub fn new(
        chunk_size: usize,
        overlap: usize,
        token_counter: TokenCounter,
    ) -> Result<Self, ChunkingError> {
        if chunk_size == 0 {
            return Err(ChunkingError::InvalidChunkSize);
        }
        Ok(Self {
            chunk_size,
            overlap: overlap.min(chunk_size - 1),
            token_counter,
        })
    }

    /// Build a splitter counting tokens with the named encoding, or whitespace words when
    /// `encoding` is `None`.
    pub fn with_encoding(
        chunk_size: usize,
        overlap: usize,
        encoding: Option<&str>,
    ) -> Result<Self, ChunkingError> {
        let counter = match encoding {
            Some(name) => build_tiktoken_counter(name)?,
            None => whitespace_token_counter(),
        };
        Self::new(chunk_size, overlap, counter)
    }

    /// Token budget per chunk.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Effective overlap in tokens.
    pub fn overlap(&self) -> usize {
        self.overlap
    }
}

impl TextSplitter for RecursiveSplitter {
    fn split(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        let counter = self.token_counter.clone();
        let chunker = Chunker::new(
            self.chunk_size,
            Box::new(move |segment: &str| counter.as_ref()(segment)),
        );
        let base_chunks = chunker.chunk(text);
        apply_overlap(base_chunks, self.chunk_size, self.overlap, &self.token_counter)
    }
}

fn build_tiktoken_counter(name: &str) -> Result<TokenCounter, ChunkingError> {
    let target = name.trim();
    let encoding = resolve_encoding(target).map_err(|error| ChunkingError::Tokenizer {
        encoding: target.to_string(),
        reason: error.to_string(),
    })?;
    let encoding = Arc::new(encoding);
    Ok(Arc::new(move |segment: &str| {
        encoding.encode_ordinary(segment).len()
    }))
}

fn resolve_encoding(name: &str) -> Result<CoreBPE, TokenizerError> {
    match name {
        "cl100k_base" => cl100k_base(),
        "o200k_base" => o200k_base(),
        "p50k_base" => p50k_base(),
        "r50k_base" | "gpt2" => r50k_base(),
        model => get_bpe_from_model(model),
    }
}

/// Count whitespace-separated words; non-empty text counts as at least one token.
pub fn whitespace_token_counter() -> TokenCounter {
    Arc::new(|segment: &str| {
        let tokens = segment.split_whitespace().count();
        if tokens == 0 && !segment.is_empty() {
            1
        } else {
            tokens
        }
    })
}

fn apply_overlap(
    chunks: Vec<String>,
    chunk_size: usize,
    overlap: usize,
    token_counter: &TokenCounter,
) -> Vec<String> {
    if overlap == 0 || chunks.len() < 2 {
        return chunks;
    }

    let mut overlapped = Vec::with_capacity(chunks.len());
    let mut previous: Option<String> = None;
    for current in chunks {
        let chunk = match &previous {
            Some(prev) => {
                build_overlapped_chunk(prev, &current, overlap, chunk_size, token_counter)
            }
            None => current.clone(),
        };
        overlapped.push(chunk);
        previous = Some(current);
    }
    overlapped
}

fn build_overlapped_chunk(
    previous: &str,
    current: &str,
    overlap: usize,
    chunk_size: usize,
    token_counter: &TokenCounter,
) -> String {
    let tail = longest_suffix_within(previous, overlap, token_counter);
    let mut combined = String::with_capacity(tail.len() + current.len() + 1);

    if !tail.is_empty() {
        combined.push_str(tail);
        let joined_by_space = tail.ends_with(char::is_whitespace)
            || current.starts_with(char::is_whitespace);
        if !joined_by_space {
            combined.push(' ');
        }
    }

    combined.push_str(current);
    longest_suffix_within(&combined, chunk_size, token_counter).to_string()
}

/// Longest trimmed suffix of `text` whose token count fits `limit`.
fn longest_suffix_within<'a>(text: &'a str, limit: usize, token_counter: &TokenCounter) -> &'a str {
    if limit == 0 {
        return "";
    }
    let trimmed = text.trim_start();
    if token_counter.as_ref()(trimmed) <= limit {
        return trimmed;
    }

    for (offset, _) in text.char_indices().skip(1) {
        let candidate = text[offset..].trim_start();
        if token_counter.as_ref()(candidate) <= limit {
            return candidate;
        }
    }
    ""
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(chunk_size: usize, overlap: usize) -> RecursiveSplitter {
        RecursiveSplitter::new(chunk_size, overlap, whitespace_token_counter()).expect("splitter")
    }

    #[test]
    fn respects_chunk_size_with_whitespace_counter() {
        let chunks = words(2, 0).split("one two three four five");
        assert_eq!(chunks, vec!["one two", "three four", "five"]);
    }

    #[test]
    fn empty_or_blank_input_yields_nothing() {
        assert!(words(4, 1).split("").is_empty());
        assert!(words(4, 1).split("  \n\t ").is_empty());
    }

    #[test]
    fn applies_overlap_within_budget() {
        let counter = whitespace_token_counter();
        let chunks = words(3, 1).split("one two three four five");
        assert_eq!(chunks, vec!["one two three", "three four five"]);
        for chunk in &chunks {
            assert!(counter.as_ref()(chunk) <= 3);
        }
    }

    #[test]
    fn splitting_is_deterministic() {
        let text = "Alpha beta gamma. Delta epsilon zeta.\n\nEta theta iota kappa lambda mu.";
        let splitter = words(4, 1);
        assert_eq!(splitter.split(text), splitter.split(text));
    }

    #[test]
    fn rejects_zero_chunk_size() {
        assert!(matches!(
            RecursiveSplitter::new(0, 0, whitespace_token_counter()),
            Err(ChunkingError::InvalidChunkSize)
        ));
    }

    #[test]
    fn overlap_is_clamped_below_chunk_size() {
        assert_eq!(words(3, 10).overlap(), 2);
        assert_eq!(words(500, 100).overlap(), 100);
    }

    #[test]
    fn tiktoken_budget_is_respected() {
        let text = "The quick brown fox jumps over the lazy dog.";
        let splitter =
            RecursiveSplitter::with_encoding(5, 0, Some("cl100k_base")).expect("splitter");
        let counter = build_tiktoken_counter("cl100k_base").expect("counter");
        let chunks = splitter.split(text);
        for chunk in &chunks {
            assert!(counter.as_ref()(chunk) <= 5);
        }
        let rejoined: Vec<&str> = chunks.iter().flat_map(|c| c.split_whitespace()).collect();
        assert_eq!(rejoined, text.split_whitespace().collect::<Vec<_>>());
    }
}
