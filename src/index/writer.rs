//! Record writes: batched upserts and delete-by-source.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use super::SearchIndex;
use super::filters::SourceFilter;
use super::schema::KEY_FIELD;
use super::types::{IndexError, IndexRecord};

/// Outcome of [`IndexWriter::delete_by_source`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteReport {
    /// Filenames whose records are gone (or never existed).
    pub removed: BTreeSet<String>,
    /// Filenames whose deletion failed, with the error text.
    pub failed: BTreeMap<String, String>,
    /// Number of records deleted.
    pub records_removed: usize,
}

impl DeleteReport {
    fn merge(&mut self, other: DeleteReport) {
        self.removed.extend(other.removed);
        self.failed.extend(other.failed);
        self.records_removed += other.records_removed;
    }
}

/// Writes records into one index.
#[derive(Clone)]
pub struct IndexWriter {
    index: Arc<dyn SearchIndex>,
    index_name: String,
    upload_batch_size: usize,
    delete_batch_size: usize,
}

impl IndexWriter {
    /// Create a writer for `index_name` with the given batch limits (clamped to at least one).
    pub fn new(
        index: Arc<dyn SearchIndex>,
        index_name: impl Into<String>,
        upload_batch_size: usize,
        delete_batch_size: usize,
    ) -> Self {
        Self {
            index,
            index_name: index_name.into(),
            upload_batch_size: upload_batch_size.max(1),
            delete_batch_size: delete_batch_size.max(1),
        }
    }

    /// Remove every record whose `metadata.source` is one of `filenames`.
    ///
    /// Filenames are processed in batches; a failed batch is logged and reported while the
    /// remaining batches still run. An empty set is a no-op.
    pub async fn delete_by_source(&self, filenames: &BTreeSet<String>) -> DeleteReport {
        let mut report = DeleteReport::default();
        if filenames.is_empty() {
            return report;
        }

        let names: Vec<&String> = filenames.iter().collect();
        for batch in names.chunks(self.delete_batch_size) {
            let filter = SourceFilter::new(batch.iter().map(|name| name.as_str()));
            report.merge(self.delete_batch(&filter).await);
        }

        tracing::info!(
            index = %self.index_name,
            files = report.removed.len(),
            failed = report.failed.len(),
            records = report.records_removed,
            "Deleted records by source"
        );
        report
    }

    async fn delete_batch(&self, filter: &SourceFilter) -> DeleteReport {
        tracing::debug!(index = %self.index_name, filter = %filter, "Resolving records to delete");
        match self.resolve_and_delete(filter).await {
            Ok(records_removed) => DeleteReport {
                removed: filter.sources().iter().cloned().collect(),
                failed: BTreeMap::new(),
                records_removed,
            },
            Err(error) => {
                tracing::error!(
                    index = %self.index_name,
                    filter = %filter,
                    error = %error,
                    "Failed to delete records"
                );
                DeleteReport {
                    removed: BTreeSet::new(),
                    failed: filter
                        .sources()
                        .iter()
                        .map(|name| (name.clone(), error.to_string()))
                        .collect(),
                    records_removed: 0,
                }
            }
        }
    }

    async fn resolve_and_delete(&self, filter: &SourceFilter) -> Result<usize, IndexError> {
        let points = match self
            .index
            .query(&self.index_name, Some(filter), &[KEY_FIELD])
            .await
        {
            Ok(points) => points,
            Err(IndexError::NotFound(_)) => return Ok(0),
            Err(error) => return Err(error),
        };
        let ids: Vec<String> = points.into_iter().map(|point| point.point_id).collect();
        if ids.is_empty() {
            return Ok(0);
        }
        self.index.delete_by_ids(&self.index_name, ids).await
    }

    /// Write records in batches, stopping at the first failed batch.
    pub async fn upsert(&self, records: Vec<IndexRecord>) -> Result<usize, IndexError> {
        let mut written = 0;
        let mut pending = records.into_iter().peekable();
        while pending.peek().is_some() {
            let batch: Vec<IndexRecord> = pending.by_ref().take(self.upload_batch_size).collect();
            written += self.index.upload(&self.index_name, batch).await?;
        }
        Ok(written)
    }
}
