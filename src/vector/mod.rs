//! Qdrant vector index integration.
//!
//! One collection per session, created lazily and deleted only as a whole. Collections use
//! cosine distance, so scores are similarities: larger means more relevant, and the
//! retrieval threshold is compared with `>=`.

mod client;
pub mod types;

pub use client::VectorIndexService;
pub use types::{ChunkInsert, ScoredChunk, VectorError};
