//! Hash-based reconciliation between a source container and a search index.
//!
//! A run scans the source, reads the fingerprints the index holds, and computes the difference.
//! Vanished files are deleted, changed files are replaced wholesale, and new files are ingested.
//! Unchanged files are never read past hashing.

pub mod engine;
pub mod plan;
/// Run outcomes and fatal errors.
pub mod types;

pub use engine::Reconciler;
pub use plan::{
    ReconciliationPlan, force_reingest, plan_reconciliation, replace_all_pending,
};
pub use types::{
    FileFailure, IngestedFile, RunStatus, SkippedFile, SyncError, SyncReport,
};
