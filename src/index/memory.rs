//! In-process [`SearchIndex`] backend for dry runs and tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::SearchIndex;
use super::filters::SourceFilter;
use super::payload::{point_id, record_payload};
use super::schema::IndexSchema;
use super::types::{IndexError, IndexRecord, IndexStatus, IndexedPoint};

struct MemoryCollection {
    dimensions: Option<usize>,
    points: BTreeMap<String, IndexRecord>,
}

/// Index held entirely in memory; points are keyed by the same derived ids Qdrant would use.
#[derive(Default)]
pub struct MemoryIndex {
    collections: Mutex<HashMap<String, MemoryCollection>>,
}

impl MemoryIndex {
    /// Create an empty backend with no indexes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the records in `name`, ordered by record id.
    pub fn records(&self, name: &str) -> Vec<IndexRecord> {
        let collections = self.collections.lock().unwrap_or_else(PoisonError::into_inner);
        let mut records: Vec<IndexRecord> = collections
            .get(name)
            .map(|collection| collection.points.values().cloned().collect())
            .unwrap_or_default();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }
}

/// Keep only the dotted `select` paths of a payload.
fn project(payload: &Map<String, Value>, select: &[&str]) -> Map<String, Value> {
    let mut projected = Map::new();
    for path in select {
        let mut parts = path.split('.');
        let Some(head) = parts.next() else { continue };
        let rest: Vec<&str> = parts.collect();
        let Some(value) = payload.get(head) else { continue };
        if rest.is_empty() {
            projected.insert(head.to_string(), value.clone());
            continue;
        }
        let (Some(nested), Some(target)) = (value.as_object(), projected_object(&mut projected, head))
        else {
            continue;
        };
        let inner = project(nested, &[rest.join(".").as_str()]);
        target.extend(inner);
    }
    projected
}

fn projected_object<'a>(map: &'a mut Map<String, Value>, key: &str) -> Option<&'a mut Map<String, Value>> {
    map.entry(key.to_string())
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
}

#[async_trait]
impl SearchIndex for MemoryIndex {
    async fn list_index_names(&self) -> Result<Vec<String>, IndexError> {
        let collections = self.collections.lock().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = collections.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn create_index(&self, schema: &IndexSchema) -> Result<(), IndexError> {
        let dimensions = schema
            .vector_fields()
            .first()
            .map(|(_, dimensions, _)| *dimensions);
        let mut collections = self.collections.lock().unwrap_or_else(PoisonError::into_inner);
        collections
            .entry(schema.name.clone())
            .or_insert_with(|| MemoryCollection {
                dimensions,
                points: BTreeMap::new(),
            });
        Ok(())
    }

    async fn index_status(&self, name: &str) -> Result<IndexStatus, IndexError> {
        let collections = self.collections.lock().unwrap_or_else(PoisonError::into_inner);
        if collections.contains_key(name) {
            Ok(IndexStatus::Ready)
        } else {
            Err(IndexError::NotFound(name.to_string()))
        }
    }

    async fn query(
        &self,
        name: &str,
        filter: Option<&SourceFilter>,
        select: &[&str],
    ) -> Result<Vec<IndexedPoint>, IndexError> {
        let collections = self.collections.lock().unwrap_or_else(PoisonError::into_inner);
        let collection = collections
            .get(name)
            .ok_or_else(|| IndexError::NotFound(name.to_string()))?;

        Ok(collection
            .points
            .iter()
            .filter_map(|(id, record)| {
                let Value::Object(payload) = record_payload(record) else {
                    return None;
                };
                if filter.is_some_and(|filter| !filter.matches(&payload)) {
                    return None;
                }
                Some(IndexedPoint {
                    point_id: id.clone(),
                    payload: project(&payload, select),
                })
            })
            .collect())
    }

    async fn upload(&self, name: &str, records: Vec<IndexRecord>) -> Result<usize, IndexError> {
        let mut collections = self.collections.lock().unwrap_or_else(PoisonError::into_inner);
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| IndexError::NotFound(name.to_string()))?;

        if let Some(expected) = collection.dimensions
            && let Some(bad) = records.iter().find(|record| record.vector.len() != expected)
        {
            return Err(IndexError::Rejected(format!(
                "record '{}' has {} dimensions, expected {expected}",
                bad.id,
                bad.vector.len()
            )));
        }

        let count = records.len();
        for record in records {
            collection.points.insert(point_id(&record.id), record);
        }
        Ok(count)
    }

    async fn delete_by_ids(&self, name: &str, ids: Vec<String>) -> Result<usize, IndexError> {
        let mut collections = self.collections.lock().unwrap_or_else(PoisonError::into_inner);
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| IndexError::NotFound(name.to_string()))?;
        Ok(ids
            .iter()
            .filter(|id| collection.points.remove(id.as_str()).is_some())
            .count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::RecordMetadata;

    fn record(id: &str, source: &str, dims: usize) -> IndexRecord {
        IndexRecord {
            id: id.into(),
            content: format!("text of {id}"),
            vector: vec![0.0; dims],
            metadata: RecordMetadata {
                source: source.into(),
                file_hash: "h".into(),
                attributes: Vec::new(),
            },
        }
    }

    #[tokio::test]
    async fn upserts_replace_same_record_id() {
        let index = MemoryIndex::new();
        index
            .create_index(&IndexSchema::for_documents("docs", 2))
            .await
            .expect("create");
        index
            .upload("docs", vec![record("a_0", "a", 2)])
            .await
            .expect("upload");
        index
            .upload("docs", vec![record("a_0", "a", 2)])
            .await
            .expect("upload");
        assert_eq!(index.records("docs").len(), 1);
    }

    #[tokio::test]
    async fn rejects_wrong_dimension() {
        let index = MemoryIndex::new();
        index
            .create_index(&IndexSchema::for_documents("docs", 3))
            .await
            .expect("create");
        let error = index
            .upload("docs", vec![record("a_0", "a", 2)])
            .await
            .unwrap_err();
        assert!(matches!(error, IndexError::Rejected(_)));
    }

    #[tokio::test]
    async fn query_filters_and_projects() {
        let index = MemoryIndex::new();
        index
            .create_index(&IndexSchema::for_documents("docs", 1))
            .await
            .expect("create");
        index
            .upload("docs", vec![record("a_0", "a", 1), record("b_0", "b", 1)])
            .await
            .expect("upload");

        let filter = SourceFilter::new(["b"]);
        let points = index
            .query("docs", Some(&filter), &["metadata.source"])
            .await
            .expect("query");
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].payload["metadata"]["source"], "b");
        assert!(points[0].payload.get("content").is_none());
        assert!(points[0].payload["metadata"].get("file_hash").is_none());

        assert!(matches!(
            index.query("absent", None, &[]).await,
            Err(IndexError::NotFound(_))
        ));
    }
}
