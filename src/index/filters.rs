//! Source filters for metadata queries and payload field extraction.

use std::fmt;

use serde_json::{Map, Value, json};

use super::schema::{FILE_HASH_FIELD, METADATA_FIELD, SOURCE_FIELD};

/// Selects every record whose `metadata.source` equals one of the given filenames.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceFilter {
    sources: Vec<String>,
}

impl SourceFilter {
    /// Build a filter over the given filenames, keeping their order.
    pub fn new<I, S>(sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sources: sources.into_iter().map(Into::into).collect(),
        }
    }

    /// Filenames selected by the filter.
    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    /// Qdrant filter clause.
    pub fn to_qdrant(&self) -> Value {
        json!({
            "must": [
                {
                    "key": format!("{METADATA_FIELD}.{SOURCE_FIELD}"),
                    "match": { "any": self.sources }
                }
            ]
        })
    }

    /// Evaluate the filter against a stored payload.
    pub fn matches(&self, payload: &Map<String, Value>) -> bool {
        metadata_str(payload, SOURCE_FIELD)
            .is_some_and(|source| self.sources.iter().any(|candidate| candidate == source))
    }
}

/// Renders the OData-style expression, e.g. `metadata/source eq 'o''brien.pdf'`.
///
/// Single quotes inside a filename are doubled so they cannot terminate the literal.
impl fmt::Display for SourceFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, source) in self.sources.iter().enumerate() {
            if idx > 0 {
                f.write_str(" or ")?;
            }
            write!(
                f,
                "{METADATA_FIELD}/{SOURCE_FIELD} eq '{}'",
                source.replace('\'', "''")
            )?;
        }
        Ok(())
    }
}

fn metadata_str<'a>(payload: &'a Map<String, Value>, field: &str) -> Option<&'a str> {
    payload
        .get(METADATA_FIELD)
        .and_then(Value::as_object)
        .and_then(|metadata| metadata.get(field))
        .and_then(Value::as_str)
}

/// Extract the `(source, file_hash)` pair from a payload, if both are present.
pub fn extract_fingerprint(payload: &Map<String, Value>) -> Option<(String, String)> {
    let source = metadata_str(payload, SOURCE_FIELD)?;
    let hash = metadata_str(payload, FILE_HASH_FIELD)?;
    Some((source.to_string(), hash.to_string()))
}
