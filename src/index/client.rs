//! HTTP client wrapper implementing [`SearchIndex`] on top of Qdrant's REST API.

use async_trait::async_trait;
use futures_util::TryStreamExt;
use reqwest::{Client, Method, StatusCode};
use serde_json::{Map, Value, json};

use super::filters::SourceFilter;
use super::payload::{point_id, record_payload};
use super::schema::{IndexSchema, VECTOR_FIELD};
use super::scroller::stream_points;
use super::types::{
    CollectionInfoResponse, IndexError, IndexRecord, IndexStatus, IndexedPoint,
    ListCollectionsResponse, UpdateResponse,
};
use super::SearchIndex;

/// Lightweight HTTP client for Qdrant operations.
pub struct QdrantIndex {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl QdrantIndex {
    /// Construct a client for the Qdrant instance at `url`.
    pub fn new(url: &str, api_key: Option<String>) -> Result<Self, IndexError> {
        let client = Client::builder().user_agent("rusty-index/0.1").build()?;
        let base_url = normalize_base_url(url).map_err(IndexError::InvalidUrl)?;
        tracing::debug!(
            url = %base_url,
            has_api_key = api_key.as_deref().is_some_and(|value| !value.is_empty()),
            "Initialized Qdrant HTTP client"
        );

        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    pub(crate) fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format_endpoint(&self.base_url, path);
        let mut req = self.client.request(method, url);
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            req = req.header("api-key", api_key);
        }
        req
    }

    async fn ensure_success<F>(
        &self,
        collection: &str,
        response: reqwest::Response,
        on_success: F,
    ) -> Result<(), IndexError>
    where
        F: FnOnce(),
    {
        let status = response.status();
        if status.is_success() {
            on_success();
            Ok(())
        } else if status == StatusCode::NOT_FOUND {
            Err(IndexError::NotFound(collection.to_string()))
        } else {
            let body = response.text().await.unwrap_or_default();
            let error = IndexError::UnexpectedStatus { status, body };
            tracing::error!(collection, error = %error, "Qdrant request failed");
            Err(error)
        }
    }

    /// Create a keyword payload index so filters on `field` stay cheap.
    async fn ensure_payload_index(&self, collection: &str, field: &str) -> Result<(), IndexError> {
        let response = self
            .request(Method::PUT, &format!("collections/{collection}/index"))
            .query(&[("wait", true)])
            .json(&json!({ "field_name": field, "field_schema": "keyword" }))
            .send()
            .await?;

        if response.status() == StatusCode::CONFLICT {
            tracing::debug!(collection, field, "Payload index already exists");
            return Ok(());
        }
        self.ensure_success(collection, response, || {
            tracing::debug!(collection, field, "Payload index ensured");
        })
        .await
    }

    async fn apply_update(
        &self,
        collection: &str,
        response: reqwest::Response,
    ) -> Result<(), IndexError> {
        let status = response.status();
        if !status.is_success() {
            return self.ensure_success(collection, response, || {}).await;
        }
        let payload: UpdateResponse = response.json().await?;
        match payload.result.and_then(|result| result.status) {
            Some(label) if label != "completed" && label != "acknowledged" => {
                Err(IndexError::Rejected(format!("update status '{label}'")))
            }
            _ => Ok(()),
        }
    }
}

/// Request body creating a collection from the schema's vector fields.
pub(crate) fn collection_body(schema: &IndexSchema) -> Value {
    let mut vectors = Map::new();
    for (name, dimensions, algorithm) in schema.vector_fields() {
        let mut params = json!({
            "size": dimensions,
            "distance": algorithm.map_or("Cosine", |a| a.distance.as_str()),
        });
        if let Some(algorithm) = algorithm
            && let Some(object) = params.as_object_mut()
        {
            object.insert(
                "hnsw_config".into(),
                json!({ "m": algorithm.m, "ef_construct": algorithm.ef_construct }),
            );
        }
        vectors.insert(name.to_string(), params);
    }
    json!({ "vectors": vectors })
}

#[async_trait]
impl SearchIndex for QdrantIndex {
    async fn list_index_names(&self) -> Result<Vec<String>, IndexError> {
        let response = self.request(Method::GET, "collections").send().await?;

        if response.status().is_success() {
            let payload: ListCollectionsResponse = response.json().await?;
            Ok(payload
                .result
                .collections
                .into_iter()
                .map(|collection| collection.name)
                .collect())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = IndexError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Failed to list collections");
            Err(error)
        }
    }

    async fn create_index(&self, schema: &IndexSchema) -> Result<(), IndexError> {
        let collection = schema.name.as_str();
        let response = self
            .request(Method::PUT, &format!("collections/{collection}"))
            .json(&collection_body(schema))
            .send()
            .await?;
        self.ensure_success(collection, response, || {
            tracing::debug!(collection, "Collection created");
        })
        .await?;

        for field in schema.filterable_paths() {
            if let Err(error) = self.ensure_payload_index(collection, &field).await {
                tracing::warn!(collection, field = %field, error = %error, "Failed to ensure payload index");
            }
        }
        Ok(())
    }

    async fn index_status(&self, name: &str) -> Result<IndexStatus, IndexError> {
        let response = self
            .request(Method::GET, &format!("collections/{name}"))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                let info: CollectionInfoResponse = response.json().await?;
                let label = info.result.status.unwrap_or_default().to_lowercase();
                Ok(match label.as_str() {
                    "green" | "yellow" | "grey" => IndexStatus::Ready,
                    "red" => IndexStatus::Failed(label.clone()),
                    _ => IndexStatus::Pending(label.clone()),
                })
            }
            StatusCode::NOT_FOUND => Err(IndexError::NotFound(name.to_string())),
            status => {
                let body = response.text().await.unwrap_or_default();
                let error = IndexError::UnexpectedStatus { status, body };
                tracing::error!(collection = name, error = %error, "Collection status check failed");
                Err(error)
            }
        }
    }

    async fn query(
        &self,
        name: &str,
        filter: Option<&SourceFilter>,
        select: &[&str],
    ) -> Result<Vec<IndexedPoint>, IndexError> {
        let with_payload = if select.is_empty() {
            Value::Bool(false)
        } else {
            json!(select)
        };
        stream_points(self, name, with_payload, filter.map(SourceFilter::to_qdrant))
            .try_collect()
            .await
    }

    async fn upload(&self, name: &str, records: Vec<IndexRecord>) -> Result<usize, IndexError> {
        if records.is_empty() {
            return Ok(0);
        }

        let points: Vec<Value> = records
            .iter()
            .map(|record| {
                json!({
                    "id": point_id(&record.id),
                    "vector": { VECTOR_FIELD: record.vector },
                    "payload": record_payload(record),
                })
            })
            .collect();
        let count = points.len();

        let response = self
            .request(Method::PUT, &format!("collections/{name}/points"))
            .query(&[("wait", true)])
            .json(&json!({ "points": points }))
            .send()
            .await?;
        self.apply_update(name, response).await?;
        tracing::debug!(collection = name, points = count, "Points uploaded");
        Ok(count)
    }

    async fn delete_by_ids(&self, name: &str, ids: Vec<String>) -> Result<usize, IndexError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let count = ids.len();
        let response = self
            .request(Method::POST, &format!("collections/{name}/points/delete"))
            .query(&[("wait", true)])
            .json(&json!({ "points": ids }))
            .send()
            .await?;
        self.apply_update(name, response).await?;
        tracing::debug!(collection = name, points = count, "Points deleted");
        Ok(count)
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

pub(crate) fn stringify_point_id(id: Value) -> String {
    match id {
        Value::String(text) => text,
        Value::Number(number) => number.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
