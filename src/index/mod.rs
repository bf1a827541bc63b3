//! Search index integration: schema lifecycle, state reads, and record writes.

pub mod client;
pub mod filters;
pub mod memory;
pub mod payload;
pub mod schema;
/// Streaming helpers for Qdrant scroll pagination.
pub mod scroller;
pub mod state;
pub mod types;
pub mod writer;

use async_trait::async_trait;

pub use client::QdrantIndex;
pub use filters::SourceFilter;
pub use memory::MemoryIndex;
pub use payload::{build_records, record_id, sanitize_filename};
pub use schema::{
    EnsuredIndex, IndexSchema, ReadinessPolicy, SchemaError, SchemaState, ensure_index,
    resolve_index_name,
};
pub use state::{IndexState, read_index_state};
pub use types::{
    IndexError, IndexRecord, IndexStatus, IndexedPoint, RecordAttribute, RecordMetadata,
};
pub use writer::{DeleteReport, IndexWriter};

/// Operations the reconciler needs from a vector search backend.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Names of every index the backend holds.
    async fn list_index_names(&self) -> Result<Vec<String>, IndexError>;

    /// Create an index with the given layout.
    async fn create_index(&self, schema: &IndexSchema) -> Result<(), IndexError>;

    /// Readiness of an existing index.
    async fn index_status(&self, name: &str) -> Result<IndexStatus, IndexError>;

    /// Every point matching `filter`, carrying only the `select`ed payload paths.
    async fn query(
        &self,
        name: &str,
        filter: Option<&SourceFilter>,
        select: &[&str],
    ) -> Result<Vec<IndexedPoint>, IndexError>;

    /// Insert or replace records; returns the number written.
    async fn upload(&self, name: &str, records: Vec<IndexRecord>) -> Result<usize, IndexError>;

    /// Delete points by backend id; returns the number removed.
    async fn delete_by_ids(&self, name: &str, ids: Vec<String>) -> Result<usize, IndexError>;
}
