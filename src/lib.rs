#![deny(missing_docs)]

//! Core library for the StudyMate retrieval-augmented study assistant.

/// Retrieval router and assistant service.
pub mod assistant;
/// Streaming chat-completion client.
pub mod chat;
/// Recursive character chunking of document text.
pub mod chunking;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Document ingestion pipeline.
pub mod ingest;
/// Structured logging and tracing setup.
pub mod logging;
/// Relational record store for sessions, documents, and messages.
pub mod store;
/// Qdrant vector index integration.
pub mod vector;
