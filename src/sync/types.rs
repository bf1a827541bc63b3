use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::chunking::ChunkingError;
use crate::embedding::EmbeddingClientError;
use crate::index::{IndexError, SchemaError, SchemaState};
use crate::metrics::MetricsSnapshot;
use crate::source::ScanError;

/// Failures that abort a run.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The index could not be created or never became ready.
    #[error(transparent)]
    Schema(#[from] SchemaError),
    /// The source container could not be fully scanned.
    #[error(transparent)]
    Scan(#[from] ScanError),
    /// The chunking pipeline could not be built.
    #[error("Failed to build chunking pipeline: {0}")]
    Chunking(#[from] ChunkingError),
    /// The embedding client could not be built.
    #[error("Failed to build embedding client: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// The index client could not be built.
    #[error("Failed to build index client: {0}")]
    Index(#[from] IndexError),
}

/// Why a single file was left out of a run.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FileFailure {
    /// Bytes could not be read from the source.
    #[error("read failed: {0}")]
    Read(String),
    /// The document could not be parsed.
    #[error("parse failed: {0}")]
    Parse(String),
    /// Parsing produced no text to index.
    #[error("no extractable text")]
    NoText,
    /// Embedding generation failed.
    #[error("embedding failed: {0}")]
    Embedding(String),
    /// Writing records failed; partial writes were rolled back.
    #[error("upload failed: {0}")]
    Upload(String),
    /// The previous version's records could not be removed.
    #[error("stale chunks not removed: {0}")]
    StaleChunks(String),
}

/// A file skipped this run; it stays eligible for the next one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFile {
    /// Source filename.
    pub filename: String,
    /// Cause of the skip.
    pub reason: FileFailure,
}

/// A file whose records were written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestedFile {
    /// Source filename.
    pub filename: String,
    /// Number of records written.
    pub chunks: usize,
}

/// Overall outcome of a run that did not abort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunStatus {
    /// Every planned file was handled.
    Completed,
    /// Some files were skipped.
    CompletedWithSkips {
        /// Number of skipped files.
        skipped: usize,
    },
}

impl RunStatus {
    /// Status of a run that skipped `skipped` files; delete failures of vanished files do not
    /// count.
    pub fn from_skips(skipped: usize) -> Self {
        if skipped == 0 {
            Self::Completed
        } else {
            Self::CompletedWithSkips { skipped }
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => f.write_str("completed"),
            Self::CompletedWithSkips { skipped } => write!(f, "completed with {skipped} skipped"),
        }
    }
}

/// Everything a run did.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    /// Index name as stored by the backend.
    pub index: String,
    /// Overall outcome.
    pub status: RunStatus,
    /// Whether the index existed or had to be created.
    pub schema: SchemaState,
    /// Set when the index state could not be read and was assumed empty.
    pub index_state_degraded: Option<String>,
    /// Files with equal hashes on both sides.
    pub unchanged: usize,
    /// Vanished filenames whose records were removed.
    pub deleted: BTreeSet<String>,
    /// Stale filenames whose removal failed, with the error text.
    pub delete_failures: BTreeMap<String, String>,
    /// Files written this run, sorted by name.
    pub ingested: Vec<IngestedFile>,
    /// Files skipped this run, sorted by name.
    pub skipped: Vec<SkippedFile>,
    /// Counter snapshot at the end of the run.
    pub metrics: MetricsSnapshot,
}

impl SyncReport {
    /// Total records written this run.
    pub fn chunks_written(&self) -> usize {
        self.ingested.iter().map(|file| file.chunks).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_display_counts_skips() {
        assert_eq!(RunStatus::Completed.to_string(), "completed");
        assert_eq!(
            RunStatus::CompletedWithSkips { skipped: 1 }.to_string(),
            "completed with 1 skipped"
        );
    }

    #[test]
    fn failure_reasons_read_naturally() {
        assert_eq!(
            FileFailure::StaleChunks("timeout".into()).to_string(),
            "stale chunks not removed: timeout"
        );
        assert_eq!(FileFailure::NoText.to_string(), "no extractable text");
    }

    #[test]
    fn failure_serializes_with_kind_tag() {
        let value = serde_json::to_value(FileFailure::Embedding("boom".into())).expect("json");
        assert_eq!(value["kind"], "embedding");
        assert_eq!(value["detail"], "boom");
    }

    #[test]
    fn report_json_carries_the_run_status() {
        let report = SyncReport {
            index: "docs".into(),
            status: RunStatus::from_skips(1),
            schema: SchemaState::Present,
            index_state_degraded: None,
            unchanged: 0,
            deleted: BTreeSet::new(),
            delete_failures: BTreeMap::new(),
            ingested: Vec::new(),
            skipped: vec![SkippedFile {
                filename: "a.pdf".into(),
                reason: FileFailure::NoText,
            }],
            metrics: MetricsSnapshot::default(),
        };

        let value = serde_json::to_value(&report).expect("json");
        assert_eq!(value["status"]["state"], "completed_with_skips");
        assert_eq!(value["status"]["skipped"], 1);
        assert_eq!(RunStatus::from_skips(0), RunStatus::Completed);
    }
}
