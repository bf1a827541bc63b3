//! Deterministic identifiers and payload layout for chunk records.

use serde_json::{Value, json};
use time::OffsetDateTime;
use uuid::Uuid;

use super::schema::{CONTENT_FIELD, KEY_FIELD, METADATA_FIELD};
use super::types::{IndexRecord, RecordAttribute, RecordMetadata};
use crate::chunking::TextSegment;

/// Replace every character outside `[A-Za-z0-9_-]` with `_`.
pub fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Record identifier for chunk `ordinal` of `filename`.
pub fn record_id(filename: &str, ordinal: usize) -> String {
    format!("{}_{ordinal}", sanitize_filename(filename))
}

/// Backend point identifier derived from a record id.
///
/// Qdrant only accepts UUIDs or integers as point ids, so the record id is mapped through a
/// name-based UUID; the readable record id travels in the payload.
pub fn point_id(record_id: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, record_id.as_bytes()).to_string()
}

/// Pair segments with their vectors into records for one source file.
///
/// Callers guarantee `segments.len() == vectors.len()`.
pub fn build_records(
    filename: &str,
    file_hash: &str,
    segments: Vec<TextSegment>,
    vectors: Vec<Vec<f32>>,
    indexed_at: &str,
) -> Vec<IndexRecord> {
    segments
        .into_iter()
        .zip(vectors)
        .map(|(segment, vector)| IndexRecord {
            id: record_id(filename, segment.ordinal),
            content: segment.text,
            vector,
            metadata: RecordMetadata {
                source: filename.to_string(),
                file_hash: file_hash.to_string(),
                attributes: vec![RecordAttribute {
                    key: "indexed_at".into(),
                    value: indexed_at.to_string(),
                }],
            },
        })
        .collect()
}

/// Payload object stored alongside the vector.
pub(crate) fn record_payload(record: &IndexRecord) -> Value {
    json!({
        KEY_FIELD: record.id,
        CONTENT_FIELD: record.content,
        METADATA_FIELD: record.metadata,
    })
}

/// Current timestamp formatted for payload storage.
pub(crate) fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}
