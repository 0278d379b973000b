//! Document ingestion pipeline.
//!
//! Loads PDF sources, extracts per-page text, chunks it, embeds the chunks, inserts them
//! into the session's vector collection, and records document metadata. A failing source is
//! logged and skipped; partial success is the normal outcome of a batch, not an error.

mod extract;

pub use extract::{ExtractError, extract_page_texts};

use std::path::PathBuf;

use thiserror::Error;

use crate::chunking;
use crate::embedding::{EmbeddingClient, EmbeddingClientError};
use crate::store::{RecordStore, StoreError};
use crate::vector::{ChunkInsert, VectorError, VectorIndexService};

/// A document source accepted by the pipeline.
#[derive(Debug, Clone)]
pub enum DocumentSource {
    /// PDF on the local filesystem.
    Path(PathBuf),
    /// PDF already held in memory, e.g. handed over by an upload layer.
    Memory {
        /// Display name recorded for the document.
        name: String,
        /// Raw PDF bytes.
        bytes: Vec<u8>,
    },
}

impl DocumentSource {
    /// Display name recorded alongside the document.
    pub fn display_name(&self) -> String {
        match self {
            Self::Path(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            Self::Memory { name, .. } => name.clone(),
        }
    }

    /// Origin string persisted in the document record.
    pub fn origin(&self) -> String {
        match self {
            Self::Path(path) => path.display().to_string(),
            Self::Memory { name, .. } => format!("in-memory://{name}"),
        }
    }
}

/// Summary of a completed ingestion batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestOutcome {
    /// Sources fully processed and recorded.
    pub ingested: usize,
    /// Sources skipped after a logged failure.
    pub skipped: usize,
}

/// Errors that abort an ingestion batch before any source is processed.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The target session does not exist.
    #[error("Session not found: {0}")]
    SessionNotFound(String),
    /// Record store lookup failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The session collection could not be prepared.
    #[error(transparent)]
    Vector(#[from] VectorError),
}

/// Failure while processing a single source; logged and skipped, never fatal to the batch.
#[derive(Debug, Error)]
enum SourceError {
    #[error("file not found")]
    Missing,
    #[error("failed to read source: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Embedding(#[from] EmbeddingClientError),
    #[error(transparent)]
    Vector(#[from] VectorError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Coordinates chunking, embedding, vector inserts, and document records for one batch.
pub struct IngestionPipeline<'a> {
    store: &'a RecordStore,
    index: &'a VectorIndexService,
    embedder: &'a (dyn EmbeddingClient + Send + Sync),
    vector_size: u64,
}

impl<'a> IngestionPipeline<'a> {
    /// Borrow the services the pipeline writes through.
    pub fn new(
        store: &'a RecordStore,
        index: &'a VectorIndexService,
        embedder: &'a (dyn EmbeddingClient + Send + Sync),
        vector_size: u64,
    ) -> Self {
        Self {
            store,
            index,
            embedder,
            vector_size,
        }
    }

    /// Ingest a batch of sources into the named session.
    ///
    /// Fails up front when the session is unknown; afterwards each source is processed
    /// independently and failures only reduce the reported success count.
    pub async fn ingest(
        &self,
        session_name: &str,
        sources: Vec<DocumentSource>,
    ) -> Result<IngestOutcome, IngestError> {
        let session_id = self
            .store
            .session_id(session_name)
            .await?
            .ok_or_else(|| IngestError::SessionNotFound(session_name.to_string()))?;
        self.index
            .ensure_collection(session_name, self.vector_size)
            .await?;

        let mut outcome = IngestOutcome::default();
        for source in sources {
            let doc_name = source.display_name();
            match self.ingest_source(session_id, session_name, source).await {
                Ok(chunks) => {
                    tracing::info!(document = %doc_name, chunks, "Document ingested");
                    outcome.ingested += 1;
                }
                Err(error) => {
                    tracing::error!(document = %doc_name, error = %error, "Skipping document");
                    outcome.skipped += 1;
                }
            }
        }

        tracing::info!(
            session = session_name,
            ingested = outcome.ingested,
            skipped = outcome.skipped,
            "Ingestion batch finished"
        );
        Ok(outcome)
    }

    async fn ingest_source(
        &self,
        session_id: i64,
        session_name: &str,
        source: DocumentSource,
    ) -> Result<usize, SourceError> {
        let doc_name = source.display_name();
        let origin = source.origin();
        let bytes = match source {
            DocumentSource::Path(path) => {
                if !path.exists() {
                    return Err(SourceError::Missing);
                }
                tokio::fs::read(&path).await?
            }
            DocumentSource::Memory { bytes, .. } => bytes,
        };

        let pages = extract_page_texts(&bytes)?;
        let mut tagged: Vec<(String, usize)> = Vec::new();
        for (page, text) in pages.iter().enumerate() {
            for chunk in chunking::split_text(text) {
                tagged.push((chunk, page));
            }
        }

        let inserted = if tagged.is_empty() {
            0
        } else {
            let texts: Vec<String> = tagged.iter().map(|(text, _)| text.clone()).collect();
            let vectors = self.embedder.embed(texts).await?;
            debug_assert_eq!(tagged.len(), vectors.len());
            let inserts: Vec<ChunkInsert> = tagged
                .into_iter()
                .zip(vectors)
                .map(|((text, page), vector)| ChunkInsert {
                    text,
                    doc_name: doc_name.clone(),
                    page,
                    vector,
                })
                .collect();
            self.index.insert_chunks(session_name, inserts).await?
        };

        self.store
            .add_document(session_id, &doc_name, &origin)
            .await?;
        Ok(inserted)
    }
}
