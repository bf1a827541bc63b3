//! Turn raw document bytes into plain text.

use thiserror::Error;

/// Per-file parse failure; the file is skipped and the run continues.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The PDF could not be decoded.
    #[error("Failed to extract PDF text: {0}")]
    Pdf(String),
    /// The document is not valid UTF-8 text.
    #[error("Document is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),
    /// Parsing ran on a worker that did not finish.
    #[error("Parser worker failed: {0}")]
    Worker(String),
}

/// Converts one document's bytes into its logical text.
pub trait DocumentParser: Send + Sync {
    /// Extract the text of `bytes`.
    fn parse(&self, bytes: &[u8]) -> Result<String, ParseError>;
}

/// PDF text extraction backed by `pdf-extract`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfParser;

impl DocumentParser for PdfParser {
    fn parse(&self, bytes: &[u8]) -> Result<String, ParseError> {
        // pdf-extract panics on some malformed font encodings instead of returning an error.
        let result = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes));
        match result {
            Ok(Ok(text)) => Ok(normalize_text(&text)),
            Ok(Err(error)) => Err(ParseError::Pdf(error.to_string())),
            Err(_) => Err(ParseError::Pdf(
                "parser panicked on malformed document".to_string(),
            )),
        }
    }
}

/// UTF-8 text documents (`.txt`, `.md`).
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextParser;

impl DocumentParser for PlainTextParser {
    fn parse(&self, bytes: &[u8]) -> Result<String, ParseError> {
        let text = std::str::from_utf8(bytes)?;
        Ok(normalize_text(text.trim_start_matches('\u{feff}')))
    }
}

/// Pick the parser for a source suffix such as `.pdf`.
pub fn parser_for_suffix(suffix: &str) -> Box<dyn DocumentParser> {
    if suffix.eq_ignore_ascii_case(".pdf") || suffix.eq_ignore_ascii_case("pdf") {
        Box::new(PdfParser)
    } else {
        Box::new(PlainTextParser)
    }
}

/// Normalize line endings, strip trailing spaces, and collapse runs of blank lines.
fn normalize_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0;
    for line in text.replace("\r\n", "\n").replace('\r', "\n").lines() {
        let line = line.trim_end();
        if line.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }
    out.trim().to_string()
}
