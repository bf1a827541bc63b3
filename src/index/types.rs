//! Shared types used by the search index client and helpers.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors returned while interacting with the search index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Base URL failed to parse or normalize.
    #[error("Invalid Qdrant URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The target index does not exist.
    #[error("Index '{0}' not found")]
    NotFound(String),
    /// Qdrant responded with an unexpected status code.
    #[error("Unexpected Qdrant response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned from Qdrant.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// The backend rejected or could not apply a record batch.
    #[error("Index rejected write: {0}")]
    Rejected(String),
}

/// Free-form key/value pair kept under `metadata.attributes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordAttribute {
    /// Attribute name.
    pub key: String,
    /// Attribute value.
    pub value: String,
}

/// Metadata object stored with every chunk record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    /// Source filename the chunk was cut from.
    pub source: String,
    /// Fingerprint of the source file at ingest time.
    pub file_hash: String,
    /// Open-ended extension attributes.
    #[serde(default)]
    pub attributes: Vec<RecordAttribute>,
}

/// Unit stored in the index: one chunk of one source file.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexRecord {
    /// Deterministic record identifier (`sanitized-filename_ordinal`).
    pub id: String,
    /// Chunk text.
    pub content: String,
    /// Embedding of `content`.
    pub vector: Vec<f32>,
    /// Provenance metadata.
    pub metadata: RecordMetadata,
}

/// Point returned by a metadata query: backend id plus the selected payload.
#[derive(Debug, Clone)]
pub struct IndexedPoint {
    /// Backend identifier accepted by [`crate::index::SearchIndex::delete_by_ids`].
    pub point_id: String,
    /// Selected payload fields.
    pub payload: Map<String, Value>,
}

/// Readiness reported for an index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexStatus {
    /// Queryable.
    Ready,
    /// Still provisioning; carries the backend status label.
    Pending(String),
    /// Backend reports the index as broken.
    Failed(String),
}

#[derive(Deserialize)]
pub(crate) struct ListCollectionsResponse {
    pub(crate) result: ListCollectionsResult,
}

#[derive(Deserialize)]
pub(crate) struct ListCollectionsResult {
    pub(crate) collections: Vec<CollectionDescription>,
}

#[derive(Deserialize)]
pub(crate) struct CollectionDescription {
    pub(crate) name: String,
}

#[derive(Deserialize)]
pub(crate) struct CollectionInfoResponse {
    pub(crate) result: CollectionInfo,
}

#[derive(Deserialize)]
pub(crate) struct CollectionInfo {
    #[serde(default)]
    pub(crate) status: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct ScrollResponse {
    pub(crate) result: ScrollResult,
}

#[derive(Deserialize)]
pub(crate) struct ScrollResult {
    #[serde(default)]
    pub(crate) points: Vec<ScrollPoint>,
    #[serde(default)]
    pub(crate) next_page_offset: Option<Value>,
}

#[derive(Deserialize)]
pub(crate) struct ScrollPoint {
    #[serde(default)]
    pub(crate) id: Option<Value>,
    #[serde(default)]
    pub(crate) payload: Option<Map<String, Value>>,
}

#[derive(Deserialize)]
pub(crate) struct UpdateResponse {
    #[serde(default)]
    pub(crate) result: Option<UpdateResult>,
}

#[derive(Deserialize)]
pub(crate) struct UpdateResult {
    #[serde(default)]
    pub(crate) status: Option<String>,
}
