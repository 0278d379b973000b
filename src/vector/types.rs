//! Shared types used by the vector index client.

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors returned while interacting with Qdrant.
#[derive(Debug, Error)]
pub enum VectorError {
    /// Base URL failed to parse or normalize.
    #[error("Invalid Qdrant URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Qdrant responded with an unexpected status code.
    #[error("Unexpected Qdrant response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned from Qdrant.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
}

/// Prepared chunk ready for indexing: text, provenance, and embedding.
#[derive(Debug, Clone)]
pub struct ChunkInsert {
    /// Raw chunk text.
    pub text: String,
    /// Display name of the source document.
    pub doc_name: String,
    /// Zero-based page index within the source document.
    pub page: usize,
    /// Embedding vector produced for the chunk.
    pub vector: Vec<f32>,
}

/// Scored chunk returned by similarity search.
///
/// The score is a cosine similarity: larger means more relevant.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    /// Identifier assigned to the vector.
    pub id: String,
    /// Similarity score computed by Qdrant.
    pub score: f32,
    /// Stored chunk text.
    pub text: String,
    /// Source document name, when stored.
    pub doc_name: Option<String>,
    /// Source page index, when stored.
    pub page: Option<usize>,
}

#[derive(Deserialize)]
pub(crate) struct QueryResponse {
    pub(crate) result: QueryResponseResult,
}

#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum QueryResponseResult {
    Points(Vec<QueryPoint>),
    Object {
        #[serde(default)]
        points: Vec<QueryPoint>,
    },
}

#[derive(Deserialize)]
pub(crate) struct QueryPoint {
    pub(crate) id: Value,
    pub(crate) score: f32,
    #[serde(default)]
    pub(crate) payload: Option<Map<String, Value>>,
}
