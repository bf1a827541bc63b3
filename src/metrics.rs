use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters updated by concurrent ingest tasks during one run.
#[derive(Default)]
pub struct SyncMetrics {
    files_ingested: AtomicU64,
    chunks_written: AtomicU64,
    files_skipped: AtomicU64,
    files_deleted: AtomicU64,
    records_deleted: AtomicU64,
}

impl SyncMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a file whose records were written, with its chunk count.
    pub fn record_ingest(&self, chunk_count: u64) {
        self.files_ingested.fetch_add(1, Ordering::Relaxed);
        self.chunks_written.fetch_add(chunk_count, Ordering::Relaxed);
    }

    /// Record a file left out of this run.
    pub fn record_skip(&self) {
        self.files_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the outcome of a delete-by-source call.
    pub fn record_delete(&self, files: u64, records: u64) {
        self.files_deleted.fetch_add(files, Ordering::Relaxed);
        self.records_deleted.fetch_add(records, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            files_ingested: self.files_ingested.load(Ordering::Relaxed),
            chunks_written: self.chunks_written.load(Ordering::Relaxed),
            files_skipped: self.files_skipped.load(Ordering::Relaxed),
            files_deleted: self.files_deleted.load(Ordering::Relaxed),
            records_deleted: self.records_deleted.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of run counters used for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Files whose records were written.
    pub files_ingested: u64,
    /// Records written across all ingested files.
    pub chunks_written: u64,
    /// Files skipped because of a per-file failure.
    pub files_skipped: u64,
    /// Filenames whose records were removed.
    pub files_deleted: u64,
    /// Records removed across all deletes.
    pub records_deleted: u64,
}
