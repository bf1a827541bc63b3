//! Streaming helper for iterating the Qdrant scroll endpoint without manual loops.

use async_stream::try_stream;
use futures_core::Stream;
use reqwest::{Method, StatusCode};
use serde_json::{Value, json};

use super::client::{QdrantIndex, stringify_point_id};
use super::types::{IndexError, IndexedPoint, ScrollResponse};

const DEFAULT_SCROLL_LIMIT: usize = 512;

/// Stream points of a collection with the selected payload fields.
///
/// A missing collection surfaces as [`IndexError::NotFound`] on the first item.
pub fn stream_points<'a>(
    service: &'a QdrantIndex,
    collection: &'a str,
    with_payload: Value,
    filter: Option<Value>,
) -> impl Stream<Item = Result<IndexedPoint, IndexError>> + 'a {
    try_stream! {
        let mut offset: Option<Value> = None;
        let filter_body = filter.unwrap_or_else(|| json!({ "must": [] }));

        loop {
            let body = json!({
                "with_payload": with_payload.clone(),
                "with_vector": false,
                "limit": DEFAULT_SCROLL_LIMIT,
                "filter": filter_body.clone(),
                "offset": offset.clone().unwrap_or(Value::Null),
            });

            let response = service
                .request(Method::POST, &format!("collections/{collection}/points/scroll"))
                .json(&body)
                .send()
                .await?;

            let status = response.status();
            if status.is_success() {
                let ScrollResponse { result } = response.json().await?;
                for point in result.points {
                    if let Some(id) = point.id {
                        yield IndexedPoint {
                            point_id: stringify_point_id(id),
                            payload: point.payload.unwrap_or_default(),
                        };
                    }
                }

                match result.next_page_offset {
                    Some(next) if !next.is_null() => offset = Some(next),
                    _ => break,
                }
            } else if status == StatusCode::NOT_FOUND {
                Err(IndexError::NotFound(collection.to_string()))?;
            } else {
                let body = response.text().await.unwrap_or_default();
                tracing::error!(collection, status = %status, "Failed to scroll points");
                Err(IndexError::UnexpectedStatus { status, body })?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{pin_mut, stream::StreamExt};
    use httpmock::{Method::POST, MockServer};

    #[tokio::test]
    async fn stream_points_collects_multiple_pages() {
        let server = MockServer::start_async().await;
        let service = QdrantIndex::new(&server.base_url(), None).expect("client");

        let first_page = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/collections/demo/points/scroll")
                    .body_contains("\"offset\":null");
                then.status(200).json_body(json!({
                    "result": {
                        "points": [
                            { "id": "a", "payload": { "metadata": { "source": "a.pdf" } } }
                        ],
                        "next_page_offset": "b"
                    }
                }));
            })
            .await;

        let second_page = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/collections/demo/points/scroll")
                    .body_contains("\"offset\":\"b\"");
                then.status(200).json_body(json!({
                    "result": {
                        "points": [
                            { "id": "b", "payload": { "metadata": { "source": "b.pdf" } } }
                        ],
                        "next_page_offset": null
                    }
                }));
            })
            .await;

        let stream = stream_points(&service, "demo", json!(["metadata.source"]), None);
        pin_mut!(stream);
        let mut items = Vec::new();
        while let Some(item) = stream.next().await {
            items.push(item.expect("point"));
        }

        first_page.assert();
        second_page.assert();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].point_id, "a");
        assert_eq!(items[1].payload["metadata"]["source"], "b.pdf");
    }

    #[tokio::test]
    async fn stream_points_reports_missing_collection() {
        let server = MockServer::start_async().await;
        let service = QdrantIndex::new(&server.base_url(), None).expect("client");

        server
            .mock_async(|when, then| {
                when.method(POST).path("/collections/absent/points/scroll");
                then.status(404).json_body(json!({ "status": { "error": "Not found" } }));
            })
            .await;

        let stream = stream_points(&service, "absent", json!(true), None);
        pin_mut!(stream);
        let first = stream.next().await.expect("item");
        assert!(matches!(first, Err(IndexError::NotFound(name)) if name == "absent"));
    }
}
