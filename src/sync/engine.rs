//! One reconciliation run: schema, scan and read, diff, delete, ingest.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use futures_util::stream::{self, StreamExt};

use super::plan::{
    ReconciliationPlan, force_reingest, plan_reconciliation, replace_all_pending,
};
use super::types::{FileFailure, IngestedFile, RunStatus, SkippedFile, SyncError, SyncReport};
use crate::chunking::{ChunkingPipeline, ParseError};
use crate::config::{Config, SyncSettings};
use crate::embedding::{EmbeddingClient, build_embedding_client, embed_in_batches};
use crate::hashing::hash_bytes;
use crate::index::payload::current_timestamp_rfc3339;
use crate::index::{
    IndexSchema, IndexState, IndexWriter, QdrantIndex, ReadinessPolicy, SearchIndex, build_records,
    ensure_index, read_index_state, resolve_index_name,
};
use crate::metrics::SyncMetrics;
use crate::source::{LocalDirStore, ObjectRef, SourceStore, scan_sources};

/// Keeps one index in step with one source container.
pub struct Reconciler {
    settings: SyncSettings,
    source: Arc<dyn SourceStore>,
    index: Arc<dyn SearchIndex>,
    embedder: Arc<dyn EmbeddingClient>,
    pipeline: ChunkingPipeline,
    schema: IndexSchema,
    readiness: ReadinessPolicy,
}

struct Survey {
    source: BTreeMap<String, String>,
    state: IndexState,
    plan: ReconciliationPlan,
}

impl Reconciler {
    /// Wire a reconciler from explicit collaborators.
    pub fn new(
        settings: SyncSettings,
        source: Arc<dyn SourceStore>,
        index: Arc<dyn SearchIndex>,
        embedder: Arc<dyn EmbeddingClient>,
        pipeline: ChunkingPipeline,
    ) -> Self {
        let schema = IndexSchema::for_documents(&settings.index_name, settings.embedding_dimension);
        let readiness = ReadinessPolicy::with_timeout(settings.index_ready_timeout);
        Self {
            settings,
            source,
            index,
            embedder,
            pipeline,
            schema,
            readiness,
        }
    }

    /// Replace the readiness polling bounds used after index creation.
    pub fn with_readiness(mut self, readiness: ReadinessPolicy) -> Self {
        self.readiness = readiness;
        self
    }

    /// Build the production wiring: local directory, Qdrant, and the configured embedder.
    pub fn from_config(config: &Config) -> Result<Self, SyncError> {
        let settings = config.sync_settings();
        let source = Arc::new(LocalDirStore::new(config.source_dir.clone()));
        let index = Arc::new(QdrantIndex::new(
            &config.qdrant_url,
            config.qdrant_api_key.clone(),
        )?);
        let embedder: Arc<dyn EmbeddingClient> = Arc::from(build_embedding_client(config)?);
        let pipeline = ChunkingPipeline::for_settings(&settings)?;
        Ok(Self::new(settings, source, index, embedder, pipeline))
    }

    /// Settings this reconciler runs with.
    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Compute the plan without touching the index.
    pub async fn plan(&self) -> Result<ReconciliationPlan, SyncError> {
        let index_name = match resolve_index_name(self.index.as_ref(), &self.settings.index_name)
            .await
        {
            Ok(Some(name)) => name,
            Ok(None) => self.settings.index_name.clone(),
            Err(error) => {
                tracing::warn!(
                    error = %error,
                    "Could not list indexes; planning against configured name"
                );
                self.settings.index_name.clone()
            }
        };
        Ok(self.survey(&index_name).await?.plan)
    }

    async fn survey(&self, index_name: &str) -> Result<Survey, SyncError> {
        let (scanned, state) = tokio::join!(
            scan_sources(self.source.as_ref(), &self.settings.source_suffix),
            read_index_state(self.index.as_ref(), index_name),
        );
        let source = scanned?;
        let mut plan = plan_reconciliation(&source, &state.files);
        force_reingest(&mut plan, &state.divergent, &source);
        if state.degraded.is_some() {
            replace_all_pending(&mut plan);
        }

        tracing::info!(
            index = index_name,
            sources = source.len(),
            indexed = state.files.len(),
            to_delete = plan.to_delete.len(),
            to_ingest = plan.to_ingest.len(),
            changed = plan.changed.len(),
            unchanged = plan.unchanged,
            "Planned reconciliation"
        );
        Ok(Survey {
            source,
            state,
            plan,
        })
    }

    /// Bring the index in line with the source container.
    ///
    /// Schema, scan, and index-creation failures abort the run. Failures confined to one file
    /// skip that file and are listed in the report; the file is retried on the next run.
    pub async fn process(&self) -> Result<SyncReport, SyncError> {
        let metrics = SyncMetrics::new();
        let ensured = ensure_index(self.index.as_ref(), &self.schema, self.readiness).await?;
        let Survey {
            source,
            state,
            plan,
        } = self.survey(&ensured.name).await?;

        let writer = IndexWriter::new(
            self.index.clone(),
            &ensured.name,
            self.settings.upload_batch_size,
            self.settings.delete_batch_size,
        );

        let delete_report = writer.delete_by_source(&plan.deletions()).await;
        let deleted: BTreeSet<String> = delete_report
            .removed
            .intersection(&plan.to_delete)
            .cloned()
            .collect();
        metrics.record_delete(deleted.len() as u64, delete_report.records_removed as u64);

        let mut skipped = Vec::new();
        let mut delete_failures = BTreeMap::new();
        for (name, error) in delete_report.failed {
            if plan.changed.contains(&name) {
                tracing::warn!(file = %name, error = %error, "Old version not removed; skipping file");
                metrics.record_skip();
                skipped.push(SkippedFile {
                    filename: name,
                    reason: FileFailure::StaleChunks(error),
                });
            } else {
                delete_failures.insert(name, error);
            }
        }

        let blocked: BTreeSet<&str> = skipped.iter().map(|s| s.filename.as_str()).collect();
        let jobs: Vec<(String, String)> = plan
            .to_ingest
            .iter()
            .filter(|(name, _)| !blocked.contains(name.as_str()))
            .map(|(name, hash)| (name.clone(), hash.clone()))
            .collect();

        let indexed_at = current_timestamp_rfc3339();
        let outcomes: Vec<Result<IngestedFile, SkippedFile>> = stream::iter(jobs)
            .map(|(name, hash)| self.ingest_file(name, hash, &writer, &metrics, &indexed_at))
            .buffer_unordered(self.settings.ingest_concurrency.max(1))
            .collect()
            .await;

        let mut ingested = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok(file) => ingested.push(file),
                Err(skip) => skipped.push(skip),
            }
        }
        ingested.sort_by(|a, b| a.filename.cmp(&b.filename));
        skipped.sort_by(|a, b| a.filename.cmp(&b.filename));

        let report = SyncReport {
            index: ensured.name,
            status: RunStatus::from_skips(skipped.len()),
            schema: ensured.state,
            index_state_degraded: state.degraded,
            unchanged: plan.unchanged,
            deleted,
            delete_failures,
            ingested,
            skipped,
            metrics: metrics.snapshot(),
        };
        tracing::info!(
            index = %report.index,
            status = %report.status,
            sources = source.len(),
            deleted = report.deleted.len(),
            ingested = report.ingested.len(),
            chunks = report.chunks_written(),
            skipped = report.skipped.len(),
            "Reconciliation finished"
        );
        Ok(report)
    }

    async fn ingest_file(
        &self,
        filename: String,
        planned_hash: String,
        writer: &IndexWriter,
        metrics: &SyncMetrics,
        indexed_at: &str,
    ) -> Result<IngestedFile, SkippedFile> {
        match self
            .build_and_write(&filename, &planned_hash, writer, indexed_at)
            .await
        {
            Ok(chunks) => {
                metrics.record_ingest(chunks as u64);
                tracing::info!(file = %filename, chunks, "Ingested file");
                Ok(IngestedFile { filename, chunks })
            }
            Err(reason) => {
                metrics.record_skip();
                tracing::warn!(file = %filename, reason = %reason, "Skipping file");
                Err(SkippedFile { filename, reason })
            }
        }
    }

    async fn build_and_write(
        &self,
        filename: &str,
        planned_hash: &str,
        writer: &IndexWriter,
        indexed_at: &str,
    ) -> Result<usize, FileFailure> {
        let bytes = self
            .source
            .read_all(&ObjectRef::new(filename))
            .await
            .map_err(|error| FileFailure::Read(error.to_string()))?;

        // Fingerprint what is actually indexed so a file edited after the scan is picked up again.
        let file_hash = hash_bytes(&bytes);
        if file_hash != planned_hash {
            tracing::debug!(file = filename, "Source changed since scan; indexing current bytes");
        }

        let pipeline = self.pipeline.clone();
        let segments = tokio::task::spawn_blocking(move || pipeline.split(&bytes))
            .await
            .map_err(|error| FileFailure::Parse(ParseError::Worker(error.to_string()).to_string()))?
            .map_err(|error| FileFailure::Parse(error.to_string()))?;
        if segments.is_empty() {
            return Err(FileFailure::NoText);
        }
        tracing::debug!(file = filename, segments = segments.len(), "Split document");

        let texts: Vec<String> = segments.iter().map(|segment| segment.text.clone()).collect();
        let vectors = embed_in_batches(
            self.embedder.as_ref(),
            texts,
            self.settings.embedding_batch_size,
            self.settings.embedding_dimension,
        )
        .await
        .map_err(|error| FileFailure::Embedding(error.to_string()))?;

        let records = build_records(filename, &file_hash, segments, vectors, indexed_at);
        match writer.upsert(records).await {
            Ok(written) => Ok(written),
            Err(error) => {
                self.roll_back(filename, writer).await;
                Err(FileFailure::Upload(error.to_string()))
            }
        }
    }

    /// Remove whatever part of a file made it into the index before a failed upload.
    async fn roll_back(&self, filename: &str, writer: &IndexWriter) {
        let target = BTreeSet::from([filename.to_string()]);
        let report = writer.delete_by_source(&target).await;
        if let Some(error) = report.failed.get(filename) {
            tracing::error!(
                file = filename,
                error = %error,
                "Rollback failed; partial records remain until the next change to this file"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::{PlainTextParser, RecursiveSplitter, whitespace_token_counter};
    use crate::embedding::HashingEmbeddingClient;
    use crate::index::{MemoryIndex, SchemaState};
    use std::fs;

    const DIM: usize = 8;

    fn reconciler(dir: &std::path::Path, index: Arc<MemoryIndex>) -> Reconciler {
        let mut settings = SyncSettings::new("docs", DIM);
        settings.source_suffix = ".txt".into();
        settings.chunk_size = 4;
        settings.chunk_overlap = 1;
        let splitter =
            RecursiveSplitter::new(4, 1, whitespace_token_counter()).expect("splitter");
        Reconciler::new(
            settings,
            Arc::new(LocalDirStore::new(dir)),
            index,
            Arc::new(HashingEmbeddingClient::new(DIM)),
            ChunkingPipeline::new(Arc::new(PlainTextParser), Arc::new(splitter)),
        )
    }

    #[tokio::test]
    async fn first_run_creates_index_and_ingests() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("a.txt"), "one two three four five six").expect("write");
        fs::write(dir.path().join("skip.pdf"), "ignored").expect("write");
        let index = Arc::new(MemoryIndex::new());

        let report = reconciler(dir.path(), index.clone())
            .process()
            .await
            .expect("process");

        assert_eq!(report.schema, SchemaState::Created);
        assert_eq!(report.ingested.len(), 1);
        assert_eq!(report.ingested[0].filename, "a.txt");
        let records = index.records("docs");
        assert_eq!(records.len(), report.chunks_written());
        assert!(records.iter().all(|r| r.metadata.source == "a.txt"));
        assert_eq!(records[0].id, "a_txt_0");
    }

    #[tokio::test]
    async fn dry_run_plan_writes_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("a.txt"), "alpha beta").expect("write");
        let index = Arc::new(MemoryIndex::new());

        let plan = reconciler(dir.path(), index.clone())
            .plan()
            .await
            .expect("plan");

        assert_eq!(plan.to_ingest.len(), 1);
        assert!(index.list_index_names().await.expect("names").is_empty());
    }
}
