//! Index layout and the create-if-absent lifecycle.
//!
//! The schema is asserted once: when the target index is missing it is created with the fixed
//! field/vector-profile layout below and the manager then polls until the backend reports it
//! queryable. An existing index is never altered.

use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;

use super::SearchIndex;
use super::types::{IndexError, IndexStatus};

/// Key field holding the deterministic record id.
pub const KEY_FIELD: &str = "id";
/// Searchable chunk text.
pub const CONTENT_FIELD: &str = "content";
/// Vector field bound to [`VECTOR_PROFILE`].
pub const VECTOR_FIELD: &str = "content_vector";
/// Complex provenance object.
pub const METADATA_FIELD: &str = "metadata";
/// Source filename inside `metadata`.
pub const SOURCE_FIELD: &str = "source";
/// File fingerprint inside `metadata`.
pub const FILE_HASH_FIELD: &str = "file_hash";
/// Extension list inside `metadata`.
pub const ATTRIBUTES_FIELD: &str = "attributes";
/// Vector-search profile name.
pub const VECTOR_PROFILE: &str = "content-vector-profile";
/// HNSW algorithm configuration name.
pub const HNSW_CONFIG: &str = "content-hnsw";

/// Data type of a schema field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    /// UTF-8 string.
    String,
    /// Fixed-dimension float vector searchable through a named profile.
    Vector {
        /// Vector length.
        dimensions: usize,
        /// Profile the field is bound to.
        profile: String,
    },
    /// Nested object.
    Complex,
    /// List of nested objects.
    ComplexCollection,
}

/// One field of the index layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaField {
    /// Field name.
    pub name: String,
    /// Field type.
    pub kind: FieldKind,
    /// Whether this field is the record key.
    pub key: bool,
    /// Whether the field can be used in filters.
    pub filterable: bool,
    /// Whether the field participates in search.
    pub searchable: bool,
    /// Sub-fields of complex fields.
    pub fields: Vec<SchemaField>,
}

impl SchemaField {
    fn string(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: FieldKind::String,
            key: false,
            filterable: false,
            searchable: false,
            fields: Vec::new(),
        }
    }

    fn filterable(mut self) -> Self {
        self.filterable = true;
        self
    }

    fn searchable(mut self) -> Self {
        self.searchable = true;
        self
    }
}

/// Distance metric used by a vector algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Distance {
    /// Cosine similarity.
    Cosine,
    /// Dot product.
    Dot,
    /// Euclidean distance.
    Euclid,
}

impl Distance {
    /// Label understood by Qdrant.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cosine => "Cosine",
            Self::Dot => "Dot",
            Self::Euclid => "Euclid",
        }
    }
}

/// HNSW graph parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HnswAlgorithm {
    /// Configuration name referenced by profiles.
    pub name: String,
    /// Edges per node.
    pub m: usize,
    /// Build-time candidate list size.
    pub ef_construct: usize,
    /// Similarity metric.
    pub distance: Distance,
}

/// Named binding between a vector field and an algorithm configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorProfile {
    /// Profile name.
    pub name: String,
    /// Algorithm configuration name.
    pub algorithm: String,
}

/// Complete field and vector-profile layout of the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSchema {
    /// Index name.
    pub name: String,
    /// Top-level fields.
    pub fields: Vec<SchemaField>,
    /// Vector-search profiles.
    pub profiles: Vec<VectorProfile>,
    /// Algorithm configurations.
    pub algorithms: Vec<HnswAlgorithm>,
}

impl IndexSchema {
    /// The document chunk layout used by the reconciler.
    pub fn for_documents(name: impl Into<String>, dimensions: usize) -> Self {
        let attributes = SchemaField {
            name: ATTRIBUTES_FIELD.to_string(),
            kind: FieldKind::ComplexCollection,
            key: false,
            filterable: false,
            searchable: false,
            fields: vec![
                SchemaField::string("key").filterable().searchable(),
                SchemaField::string("value").filterable().searchable(),
            ],
        };
        let metadata = SchemaField {
            name: METADATA_FIELD.to_string(),
            kind: FieldKind::Complex,
            key: false,
            filterable: false,
            searchable: false,
            fields: vec![
                SchemaField::string(SOURCE_FIELD).filterable().searchable(),
                SchemaField::string(FILE_HASH_FIELD).filterable(),
                attributes,
            ],
        };
        let key = SchemaField {
            key: true,
            ..SchemaField::string(KEY_FIELD).filterable().searchable()
        };
        let vector = SchemaField {
            name: VECTOR_FIELD.to_string(),
            kind: FieldKind::Vector {
                dimensions,
                profile: VECTOR_PROFILE.to_string(),
            },
            key: false,
            filterable: false,
            searchable: true,
            fields: Vec::new(),
        };

        Self {
            name: name.into(),
            fields: vec![
                key,
                SchemaField::string(CONTENT_FIELD).searchable(),
                vector,
                metadata,
            ],
            profiles: vec![VectorProfile {
                name: VECTOR_PROFILE.to_string(),
                algorithm: HNSW_CONFIG.to_string(),
            }],
            algorithms: vec![HnswAlgorithm {
                name: HNSW_CONFIG.to_string(),
                m: 16,
                ef_construct: 100,
                distance: Distance::Cosine,
            }],
        }
    }

    /// Vector fields paired with their dimensions and resolved algorithm.
    pub fn vector_fields(&self) -> Vec<(&str, usize, Option<&HnswAlgorithm>)> {
        self.fields
            .iter()
            .filter_map(|field| match &field.kind {
                FieldKind::Vector {
                    dimensions,
                    profile,
                } => {
                    let algorithm = self
                        .profiles
                        .iter()
                        .find(|candidate| &candidate.name == profile)
                        .and_then(|bound| {
                            self.algorithms
                                .iter()
                                .find(|algorithm| algorithm.name == bound.algorithm)
                        });
                    Some((field.name.as_str(), *dimensions, algorithm))
                }
                _ => None,
            })
            .collect()
    }

    /// Dotted paths of filterable string fields, including nested ones.
    pub fn filterable_paths(&self) -> Vec<String> {
        fn walk(prefix: &str, fields: &[SchemaField], out: &mut Vec<String>) {
            for field in fields {
                let path = if prefix.is_empty() {
                    field.name.clone()
                } else {
                    format!("{prefix}.{}", field.name)
                };
                match field.kind {
                    FieldKind::String if field.filterable => out.push(path),
                    FieldKind::Complex => walk(&path, &field.fields, out),
                    FieldKind::ComplexCollection => walk(&format!("{path}[]"), &field.fields, out),
                    _ => {}
                }
            }
        }

        let mut paths = Vec::new();
        walk("", &self.fields, &mut paths);
        paths
    }
}

/// Fatal failures while asserting the index layout.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// Existing index names could not be listed.
    #[error("Failed to list indexes: {0}")]
    List(#[source] IndexError),
    /// Index creation was rejected.
    #[error("Failed to create index '{index}': {source}")]
    Create {
        /// Index being created.
        index: String,
        /// Backend error.
        #[source]
        source: IndexError,
    },
    /// Readiness check failed outright.
    #[error("Failed to check readiness of index '{index}': {source}")]
    Status {
        /// Index being checked.
        index: String,
        /// Backend error.
        #[source]
        source: IndexError,
    },
    /// Backend reported the new index as broken.
    #[error("Index '{index}' failed to provision: {status}")]
    Failed {
        /// Index being checked.
        index: String,
        /// Backend status label.
        status: String,
    },
    /// Index did not become ready within the bound.
    #[error("Index '{index}' not ready after {waited:?}")]
    NotReady {
        /// Index being checked.
        index: String,
        /// Time spent waiting.
        waited: Duration,
    },
}

/// Polling bounds for the readiness wait after creation.
#[derive(Debug, Clone, Copy)]
pub struct ReadinessPolicy {
    /// First delay between status checks.
    pub initial_delay: Duration,
    /// Ceiling for the doubling delay.
    pub max_delay: Duration,
    /// Total time allowed before giving up.
    pub timeout: Duration,
}

impl ReadinessPolicy {
    /// Default backoff (250 ms doubling up to 2 s) with the given overall timeout.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(2),
            timeout,
        }
    }
}

/// State the index was found in by [`ensure_index`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaState {
    /// Index already existed; nothing was changed.
    Present,
    /// Index was created and is now ready.
    Created,
}

/// Outcome of [`ensure_index`]: the name the backend knows the index by, and how it was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnsuredIndex {
    /// Collection name to use for every later call; may differ in case from the configured one.
    pub name: String,
    /// Whether the index existed or was created.
    pub state: SchemaState,
}

/// Name of the existing index matching `wanted`, ignoring ASCII case. An exact match wins.
pub async fn resolve_index_name(
    index: &dyn SearchIndex,
    wanted: &str,
) -> Result<Option<String>, IndexError> {
    let names = index.list_index_names().await?;
    Ok(match_index_name(names, wanted))
}

fn match_index_name(names: Vec<String>, wanted: &str) -> Option<String> {
    if names.iter().any(|name| name == wanted) {
        return Some(wanted.to_string());
    }
    names
        .into_iter()
        .find(|name| name.eq_ignore_ascii_case(wanted))
}

/// Create the index from `schema` when absent and wait until it is queryable.
///
/// The returned name is the one the backend stores, which later reads and writes must use.
pub async fn ensure_index(
    index: &dyn SearchIndex,
    schema: &IndexSchema,
    policy: ReadinessPolicy,
) -> Result<EnsuredIndex, SchemaError> {
    let existing = resolve_index_name(index, &schema.name)
        .await
        .map_err(SchemaError::List)?;
    if let Some(name) = existing {
        if name != schema.name {
            tracing::info!(
                configured = %schema.name,
                index = %name,
                "Existing index found under different case"
            );
        } else {
            tracing::info!(index = %name, "Existing index found");
        }
        return Ok(EnsuredIndex {
            name,
            state: SchemaState::Present,
        });
    }

    tracing::info!(index = %schema.name, "Index not found; creating");
    index
        .create_index(schema)
        .await
        .map_err(|source| SchemaError::Create {
            index: schema.name.clone(),
            source,
        })?;

    wait_until_ready(index, &schema.name, policy).await?;
    tracing::info!(index = %schema.name, "Index created and ready");
    Ok(EnsuredIndex {
        name: schema.name.clone(),
        state: SchemaState::Created,
    })
}

async fn wait_until_ready(
    index: &dyn SearchIndex,
    name: &str,
    policy: ReadinessPolicy,
) -> Result<(), SchemaError> {
    let started = Instant::now();
    let mut delay = policy.initial_delay;

    loop {
        match index.index_status(name).await {
            Ok(IndexStatus::Ready) => return Ok(()),
            Ok(IndexStatus::Failed(status)) => {
                return Err(SchemaError::Failed {
                    index: name.to_string(),
                    status,
                });
            }
            Ok(IndexStatus::Pending(status)) => {
                tracing::debug!(index = name, status = %status, "Index still provisioning");
            }
            // Freshly created indexes may not be visible on every node yet.
            Err(IndexError::NotFound(_)) => {
                tracing::debug!(index = name, "Index not visible yet");
            }
            Err(source) => {
                return Err(SchemaError::Status {
                    index: name.to_string(),
                    source,
                });
            }
        }

        let waited = started.elapsed();
        if waited >= policy.timeout {
            return Err(SchemaError::NotReady {
                index: name.to_string(),
                waited,
            });
        }
        tokio::time::sleep(delay.min(policy.timeout - waited)).await;
        delay = (delay * 2).min(policy.max_delay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_schema_has_fixed_layout() {
        let schema = IndexSchema::for_documents("docs", 1536);
        let names: Vec<&str> = schema.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["id", "content", "content_vector", "metadata"]);
        assert!(schema.fields[0].key);

        let vectors = schema.vector_fields();
        assert_eq!(vectors.len(), 1);
        let (name, dimensions, algorithm) = vectors[0];
        assert_eq!(name, "content_vector");
        assert_eq!(dimensions, 1536);
        assert_eq!(algorithm.map(|a| a.name.as_str()), Some("content-hnsw"));
    }

    #[test]
    fn filterable_paths_cover_nested_metadata() {
        let schema = IndexSchema::for_documents("docs", 8);
        assert_eq!(
            schema.filterable_paths(),
            vec![
                "id",
                "metadata.source",
                "metadata.file_hash",
                "metadata.attributes[].key",
                "metadata.attributes[].value",
            ]
        );
    }

    #[test]
    fn exact_name_wins_over_case_variant() {
        let names = vec!["DOCS".to_string(), "docs".to_string()];
        assert_eq!(match_index_name(names, "docs").as_deref(), Some("docs"));
    }

    #[test]
    fn case_variant_resolves_to_stored_name() {
        let names = vec!["other".to_string(), "Docs".to_string()];
        assert_eq!(match_index_name(names, "docs").as_deref(), Some("Docs"));
        assert_eq!(match_index_name(vec!["other".into()], "docs"), None);
    }
}
