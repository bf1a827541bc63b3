#![allow(dead_code)]

use std::collections::BTreeMap;
use std::io::{self, Cursor};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rustyindex::chunking::{
    ChunkingPipeline, PlainTextParser, RecursiveSplitter, whitespace_token_counter,
};
use rustyindex::config::SyncSettings;
use rustyindex::embedding::{EmbeddingClient, EmbeddingClientError, HashingEmbeddingClient};
use rustyindex::index::{
    IndexError, IndexRecord, IndexSchema, IndexStatus, IndexedPoint, MemoryIndex, SearchIndex,
    SourceFilter,
};
use rustyindex::source::{ObjectRef, ObjectStream, SourceError, SourceStore};
use rustyindex::sync::Reconciler;

pub const INDEX: &str = "docs";
pub const DIM: usize = 8;

/// Source container held in memory.
#[derive(Default)]
pub struct MemorySource {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    pub fail_list: AtomicBool,
}

impl MemorySource {
    pub fn with(files: &[(&str, &str)]) -> Arc<Self> {
        let source = Arc::new(Self::default());
        for (name, body) in files {
            source.put(name, body);
        }
        source
    }

    pub fn put(&self, name: &str, body: &str) {
        self.objects
            .lock()
            .expect("lock")
            .insert(name.to_string(), body.as_bytes().to_vec());
    }

    pub fn remove(&self, name: &str) {
        self.objects.lock().expect("lock").remove(name);
    }
}

#[async_trait]
impl SourceStore for MemorySource {
    async fn list(&self) -> Result<Vec<ObjectRef>, SourceError> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(SourceError::List("container unreachable".into()));
        }
        Ok(self
            .objects
            .lock()
            .expect("lock")
            .keys()
            .map(ObjectRef::new)
            .collect())
    }

    async fn open(&self, object: &ObjectRef) -> Result<ObjectStream, SourceError> {
        let bytes = self
            .objects
            .lock()
            .expect("lock")
            .get(&object.name)
            .cloned()
            .ok_or_else(|| SourceError::Read {
                name: object.name.clone(),
                source: io::Error::new(io::ErrorKind::NotFound, "missing object"),
            })?;
        Ok(Box::new(Cursor::new(bytes)))
    }
}

/// Hashing embedder that refuses any batch containing `poison`.
pub struct PoisonableEmbedder {
    inner: HashingEmbeddingClient,
    pub armed: AtomicBool,
}

impl PoisonableEmbedder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: HashingEmbeddingClient::new(DIM),
            armed: AtomicBool::new(true),
        })
    }
}

#[async_trait]
impl EmbeddingClient for PoisonableEmbedder {
    async fn embed_batch(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if self.armed.load(Ordering::SeqCst) && texts.iter().any(|text| text.contains("poison")) {
            return Err(EmbeddingClientError::GenerationFailed(
                "model rejected input".into(),
            ));
        }
        self.inner.embed_batch(texts).await
    }
}

/// [`MemoryIndex`] with switchable failures.
#[derive(Default)]
pub struct FlakyIndex {
    pub inner: MemoryIndex,
    pub fail_query: AtomicBool,
    /// Number of upcoming queries to reject before answering normally again.
    pub failing_queries: AtomicUsize,
    pub fail_delete: AtomicBool,
    pub never_ready: AtomicBool,
    /// Upload batches containing this record id are rejected.
    pub fail_upload_id: Mutex<Option<String>>,
}

impl FlakyIndex {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn records(&self) -> Vec<IndexRecord> {
        self.inner.records(INDEX)
    }

    /// Reject the next `n` queries.
    pub fn fail_next_queries(&self, n: usize) {
        self.failing_queries.store(n, Ordering::SeqCst);
    }

    pub fn records_for(&self, source: &str) -> Vec<IndexRecord> {
        self.records()
            .into_iter()
            .filter(|record| record.metadata.source == source)
            .collect()
    }
}

#[async_trait]
impl SearchIndex for FlakyIndex {
    async fn list_index_names(&self) -> Result<Vec<String>, IndexError> {
        self.inner.list_index_names().await
    }

    async fn create_index(&self, schema: &IndexSchema) -> Result<(), IndexError> {
        self.inner.create_index(schema).await
    }

    async fn index_status(&self, name: &str) -> Result<IndexStatus, IndexError> {
        if self.never_ready.load(Ordering::SeqCst) {
            return Ok(IndexStatus::Pending("grey".into()));
        }
        self.inner.index_status(name).await
    }

    async fn query(
        &self,
        name: &str,
        filter: Option<&SourceFilter>,
        select: &[&str],
    ) -> Result<Vec<IndexedPoint>, IndexError> {
        let one_shot = self
            .failing_queries
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if one_shot || self.fail_query.load(Ordering::SeqCst) {
            return Err(IndexError::Rejected("query service unavailable".into()));
        }
        self.inner.query(name, filter, select).await
    }

    async fn upload(&self, name: &str, records: Vec<IndexRecord>) -> Result<usize, IndexError> {
        let poisoned = self.fail_upload_id.lock().expect("lock").clone();
        if let Some(id) = poisoned
            && records.iter().any(|record| record.id == id)
        {
            return Err(IndexError::Rejected(format!("record '{id}' rejected")));
        }
        self.inner.upload(name, records).await
    }

    async fn delete_by_ids(&self, name: &str, ids: Vec<String>) -> Result<usize, IndexError> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(IndexError::Rejected("delete rejected".into()));
        }
        self.inner.delete_by_ids(name, ids).await
    }
}

/// Settings for small text fixtures: `.txt` sources, four-word chunks, no overlap.
pub fn settings() -> SyncSettings {
    let mut settings = SyncSettings::new(INDEX, DIM);
    settings.source_suffix = ".txt".into();
    settings.chunk_size = 4;
    settings.chunk_overlap = 0;
    settings.upload_batch_size = 1;
    settings.ingest_concurrency = 2;
    settings
}

pub fn pipeline(settings: &SyncSettings) -> ChunkingPipeline {
    let splitter = RecursiveSplitter::new(
        settings.chunk_size,
        settings.chunk_overlap,
        whitespace_token_counter(),
    )
    .expect("splitter");
    ChunkingPipeline::new(Arc::new(PlainTextParser), Arc::new(splitter))
}

pub fn reconciler(
    source: Arc<MemorySource>,
    index: Arc<FlakyIndex>,
    embedder: Arc<dyn EmbeddingClient>,
) -> Reconciler {
    let settings = settings();
    let pipeline = pipeline(&settings);
    Reconciler::new(settings, source, index, embedder, pipeline)
}

pub fn hashing_embedder() -> Arc<dyn EmbeddingClient> {
    Arc::new(HashingEmbeddingClient::new(DIM))
}

/// `n` distinct words, enough for `n / 4` chunks with [`settings`].
pub fn words(prefix: &str, n: usize) -> String {
    (0..n)
        .map(|i| format!("{prefix}{i}"))
        .collect::<Vec<_>>()
        .join(" ")
}
