//! Document bytes to ordered text segments.

pub mod parser;
pub mod splitter;

use std::sync::Arc;

use thiserror::Error;

use crate::config::SyncSettings;

pub use parser::{DocumentParser, ParseError, PdfParser, PlainTextParser, parser_for_suffix};
pub use splitter::{RecursiveSplitter, TextSplitter, TokenCounter, whitespace_token_counter};

/// One chunk of a document, numbered from zero in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSegment {
    /// Position of the segment within its document.
    pub ordinal: usize,
    /// Segment text.
    pub text: String,
}

/// Errors raised while building or running the chunking pipeline.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// The document could not be parsed.
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// A chunk size of zero was requested.
    #[error("Chunk size must be greater than zero")]
    InvalidChunkSize,
    /// The configured token encoding is unknown.
    #[error("Failed to load tokenizer `{encoding}`: {reason}")]
    Tokenizer {
        /// Requested encoding or model name.
        encoding: String,
        /// Underlying tokenizer error text.
        reason: String,
    },
}

/// Parser plus splitter; cheap to clone and safe to share across ingest tasks.
#[derive(Clone)]
pub struct ChunkingPipeline {
    parser: Arc<dyn DocumentParser>,
    splitter: Arc<dyn TextSplitter>,
}

impl ChunkingPipeline {
    /// Combine an explicit parser and splitter.
    pub fn new(parser: Arc<dyn DocumentParser>, splitter: Arc<dyn TextSplitter>) -> Self {
        Self { parser, splitter }
    }

    /// Build the pipeline for the configured suffix, chunk size, overlap, and tokenizer.
    pub fn for_settings(settings: &SyncSettings) -> Result<Self, ChunkingError> {
        let splitter = RecursiveSplitter::with_encoding(
            settings.chunk_size,
            settings.chunk_overlap,
            settings.chunk_tokenizer.as_deref(),
        )?;
        Ok(Self::new(
            Arc::from(parser_for_suffix(&settings.source_suffix)),
            Arc::new(splitter),
        ))
    }

    /// Parse and split one document.
    ///
    /// An empty result means the document carries no extractable text.
    pub fn split(&self, bytes: &[u8]) -> Result<Vec<TextSegment>, ChunkingError> {
        let text = self.parser.parse(bytes)?;
        let segments = self
            .splitter
            .split(&text)
            .into_iter()
            .filter(|chunk| !chunk.trim().is_empty())
            .enumerate()
            .map(|(ordinal, text)| TextSegment { ordinal, text })
            .collect();
        Ok(segments)
    }
}
