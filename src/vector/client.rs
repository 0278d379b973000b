//! HTTP client wrapper for interacting with Qdrant.

use crate::config::Config;
use crate::vector::types::{
    ChunkInsert, QueryPoint, QueryResponse, QueryResponseResult, ScoredChunk, VectorError,
};
use reqwest::{Client, Method, StatusCode};
use serde_json::{Value, json};
use uuid::Uuid;

/// Lightweight HTTP client for per-session Qdrant collections.
pub struct VectorIndexService {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl VectorIndexService {
    /// Construct a new client from the supplied configuration.
    pub fn new(config: &Config) -> Result<Self, VectorError> {
        let client = Client::builder()
            .user_agent("studymate/0.1")
            .build()
            .map_err(VectorError::Http)?;
        let base_url = normalize_base_url(&config.qdrant_url).map_err(VectorError::InvalidUrl)?;
        tracing::debug!(
            url = %base_url,
            has_api_key = config
                .qdrant_api_key
                .as_deref()
                .map(|value| !value.is_empty())
                .unwrap_or(false),
            "Initialized Qdrant HTTP client"
        );

        Ok(Self {
            client,
            base_url,
            api_key: config.qdrant_api_key.clone(),
        })
    }

    /// Create a session collection only when it is missing from Qdrant.
    ///
    /// Creating with an existing name resolves to the same underlying collection; vectors
    /// already stored there are untouched.
    pub async fn ensure_collection(
        &self,
        collection_name: &str,
        vector_size: u64,
    ) -> Result<(), VectorError> {
        if self.collection_exists(collection_name).await? {
            return Ok(());
        }

        tracing::debug!(
            collection = collection_name,
            vector_size,
            "Creating collection"
        );
        let body = json!({
            "vectors": {
                "size": vector_size,
                "distance": "Cosine"
            }
        });

        let response = self
            .request(Method::PUT, &format!("collections/{collection_name}"))?
            .json(&body)
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(collection = collection_name, "Collection created");
        })
        .await
    }

    /// Permanently discard a session collection and every vector in it.
    ///
    /// Deleting a collection that is already gone is treated as success so cascading
    /// session deletes stay idempotent.
    pub async fn delete_collection(&self, collection_name: &str) -> Result<(), VectorError> {
        let response = self
            .request(Method::DELETE, &format!("collections/{collection_name}"))?
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            tracing::debug!(collection = collection_name, "Collection already absent");
            return Ok(());
        }

        self.ensure_success(response, || {
            tracing::debug!(collection = collection_name, "Collection deleted");
        })
        .await
    }

    /// Whether a collection with this name exists.
    pub async fn collection_exists(&self, collection_name: &str) -> Result<bool, VectorError> {
        let response = self
            .request(Method::GET, &format!("collections/{collection_name}"))?
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => {
                let body = response.text().await.unwrap_or_default();
                let error = VectorError::UnexpectedStatus { status, body };
                tracing::error!(collection = collection_name, error = %error, "Collection existence check failed");
                Err(error)
            }
        }
    }

    /// Upload new chunk vectors to the given collection.
    ///
    /// Entries are always appended under fresh ids; nothing is deduplicated against what
    /// the collection already holds, so re-ingesting a document duplicates its chunks.
    pub async fn insert_chunks(
        &self,
        collection_name: &str,
        chunks: Vec<ChunkInsert>,
    ) -> Result<usize, VectorError> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let serialized: Vec<_> = chunks
            .into_iter()
            .map(|chunk| {
                json!({
                    "id": Uuid::new_v4().to_string(),
                    "vector": chunk.vector,
                    "payload": {
                        "text": chunk.text,
                        "doc_name": chunk.doc_name,
                        "page": chunk.page,
                    },
                })
            })
            .collect();

        let point_count = serialized.len();
        let response = self
            .request(
                Method::PUT,
                &format!("collections/{collection_name}/points"),
            )?
            .query(&[("wait", true)])
            .json(&json!({ "points": serialized }))
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(
                collection = collection_name,
                points = point_count,
                "Chunks indexed"
            );
        })
        .await?;

        Ok(point_count)
    }

    /// Perform a similarity search against a collection, returning scored chunks.
    ///
    /// No score threshold is applied here; the retrieval router filters candidates so the
    /// comparison direction lives in exactly one place.
    pub async fn search(
        &self,
        collection_name: &str,
        vector: Vec<f32>,
        limit: usize,
    ) -> Result<Vec<ScoredChunk>, VectorError> {
        let body = json!({
            "query": vector,
            "limit": limit,
            "with_payload": true,
        });

        let response = self
            .request(
                Method::POST,
                &format!("collections/{collection_name}/points/query"),
            )?
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = VectorError::UnexpectedStatus { status, body };
            tracing::error!(collection = collection_name, error = %error, "Qdrant search failed");
            return Err(error);
        }

        let payload: QueryResponse = response.json().await?;
        let points = match payload.result {
            QueryResponseResult::Points(points) => points,
            QueryResponseResult::Object { points } => points,
        };
        Ok(points.into_iter().map(map_query_point).collect())
    }

    fn request(&self, method: Method, path: &str) -> Result<reqwest::RequestBuilder, VectorError> {
        let url = format_endpoint(&self.base_url, path);
        let mut req = self.client.request(method, url);
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            req = req.header("api-key", api_key);
        }
        Ok(req)
    }

    async fn ensure_success<F>(
        &self,
        response: reqwest::Response,
        on_success: F,
    ) -> Result<(), VectorError>
    where
        F: FnOnce(),
    {
        if response.status().is_success() {
            on_success();
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = VectorError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Qdrant request failed");
            Err(error)
        }
    }
}

fn map_query_point(point: QueryPoint) -> ScoredChunk {
    let QueryPoint { id, score, payload } = point;

    let mut text = String::new();
    let mut doc_name = None;
    let mut page = None;
    if let Some(mut map) = payload {
        if let Some(Value::String(value)) = map.remove("text") {
            text = value;
        }
        if let Some(Value::String(value)) = map.remove("doc_name") {
            doc_name = Some(value);
        }
        if let Some(Value::Number(value)) = map.remove("page") {
            page = value.as_u64().map(|value| value as usize);
        }
    }

    ScoredChunk {
        id: stringify_point_id(id),
        score,
        text,
        doc_name,
        page,
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

fn stringify_point_id(id: Value) -> String {
    match id {
        Value::String(text) => text,
        Value::Number(number) => number.to_string(),
        other => other.to_string(),
    }
}
