//! Assistant service owning the retrieval-and-response pipeline.

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::assistant::prompt;
use crate::chat::{AnswerStream, ChatClient, ChatClientError};
use crate::config::Config;
use crate::embedding::{self, EmbeddingClient, EmbeddingClientError};
use crate::ingest::{DocumentSource, IngestError, IngestOutcome, IngestionPipeline};
use crate::store::{DocumentRecord, MessageRecord, RecordStore, SenderRole, SessionRecord, StoreError};
use crate::vector::{VectorError, VectorIndexService};

/// Errors raised while constructing the assistant's backing services.
#[derive(Debug, Error)]
pub enum InitError {
    /// Record store could not be opened.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Vector index client could not be constructed.
    #[error(transparent)]
    Vector(#[from] VectorError),
    /// Chat client could not be constructed.
    #[error(transparent)]
    Chat(#[from] ChatClientError),
}

/// Errors raised by session management operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Session names must contain at least one non-whitespace character.
    #[error("Session name must not be empty")]
    EmptyName,
    /// Session names must not contain embedded whitespace.
    #[error("Session name must not contain whitespace: {0:?}")]
    WhitespaceInName(String),
    /// A session with this name already exists.
    #[error("Session already exists: {0}")]
    AlreadyExists(String),
    /// No session with this name exists.
    #[error("Session not found: {0}")]
    NotFound(String),
    /// Record store operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Vector index operation failed.
    #[error(transparent)]
    Vector(#[from] VectorError),
}

/// Errors raised while answering a question.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The queried session does not exist.
    #[error("Session not found: {0}")]
    SessionNotFound(String),
    /// Record store operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Question embedding failed.
    #[error("Failed to embed question: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Embedding provider returned no vector for the question.
    #[error("Embedding provider returned no vector for the question")]
    EmptyEmbedding,
    /// Similarity search failed.
    #[error(transparent)]
    Vector(#[from] VectorError),
    /// Chat completion request failed.
    #[error(transparent)]
    Chat(#[from] ChatClientError),
}

/// Explicitly constructed service bundle behind every session and query.
///
/// Owns the record store, the vector index client, the embedding client, and the chat
/// client. Construct one near process start and share it; collection handles are resolved
/// on demand rather than cached.
pub struct StudyAssistant {
    store: RecordStore,
    index: VectorIndexService,
    embedder: Box<dyn EmbeddingClient + Send + Sync>,
    chat: ChatClient,
    embedding_dimension: usize,
    search_limit: usize,
    score_threshold: f32,
}

impl StudyAssistant {
    /// Build the assistant and its backing services from configuration.
    pub async fn new(config: &Config) -> Result<Self, InitError> {
        let store = RecordStore::open(&config.database_path).await?;
        let index = VectorIndexService::new(config)?;
        let embedder = embedding::client_for(config);
        let chat = ChatClient::new(config)?;
        tracing::info!("Assistant services initialized");

        Ok(Self {
            store,
            index,
            embedder,
            chat,
            embedding_dimension: config.embedding_dimension,
            search_limit: config.search_limit,
            score_threshold: config.score_threshold,
        })
    }

    /// Create a new session with its own vector collection.
    ///
    /// The name is validated before any side effect; the collection is created before the
    /// session row so a resolvable session always has somewhere to put its chunks.
    pub async fn create_session(
        &self,
        session_name: &str,
        subject_category: &str,
    ) -> Result<i64, SessionError> {
        let session_name = session_name.trim();
        if session_name.is_empty() {
            return Err(SessionError::EmptyName);
        }
        if session_name.chars().any(char::is_whitespace) {
            return Err(SessionError::WhitespaceInName(session_name.to_string()));
        }
        if self.store.session_exists(session_name).await? {
            return Err(SessionError::AlreadyExists(session_name.to_string()));
        }

        self.index
            .ensure_collection(session_name, self.embedding_dimension as u64)
            .await?;
        let session_id = self
            .store
            .create_session(session_name, subject_category)
            .await?
            .ok_or_else(|| SessionError::AlreadyExists(session_name.to_string()))?;
        tracing::info!(
            session = session_name,
            category = subject_category,
            "Session created"
        );
        Ok(session_id)
    }

    /// All sessions in creation order.
    pub async fn list_sessions(&self) -> Result<Vec<SessionRecord>, SessionError> {
        Ok(self.store.list_sessions().await?)
    }

    /// Delete a session's messages, documents, and row, then its vector collection.
    ///
    /// The deletes are not atomic across the two stores; a crash in between leaves either
    /// orphaned rows or an orphaned collection.
    pub async fn delete_session(&self, session_name: &str) -> Result<(), SessionError> {
        if !self.store.delete_session(session_name).await? {
            return Err(SessionError::NotFound(session_name.to_string()));
        }
        self.index.delete_collection(session_name).await?;
        tracing::info!(session = session_name, "Session deleted");
        Ok(())
    }

    /// Documents attached to a session.
    pub async fn list_documents(
        &self,
        session_name: &str,
    ) -> Result<Vec<DocumentRecord>, SessionError> {
        let session_id = self
            .store
            .session_id(session_name)
            .await?
            .ok_or_else(|| SessionError::NotFound(session_name.to_string()))?;
        Ok(self.store.list_documents(session_id).await?)
    }

    /// Full transcript of a session, oldest first.
    pub async fn history(&self, session_name: &str) -> Result<Vec<MessageRecord>, SessionError> {
        let session_id = self
            .store
            .session_id(session_name)
            .await?
            .ok_or_else(|| SessionError::NotFound(session_name.to_string()))?;
        Ok(self.store.list_messages(session_id).await?)
    }

    /// The most recent message of a session, if any.
    pub async fn latest_message(
        &self,
        session_name: &str,
    ) -> Result<Option<MessageRecord>, SessionError> {
        let session_id = self
            .store
            .session_id(session_name)
            .await?
            .ok_or_else(|| SessionError::NotFound(session_name.to_string()))?;
        Ok(self.store.latest_message(session_id).await?)
    }

    /// Append one message to a session's transcript.
    ///
    /// The streamer performs no persistence; callers use this to record the question
    /// before streaming starts and the assembled answer after it ends.
    pub async fn record_message(
        &self,
        session_name: &str,
        sender: SenderRole,
        content: &str,
    ) -> Result<(), SessionError> {
        let session_id = self
            .store
            .session_id(session_name)
            .await?
            .ok_or_else(|| SessionError::NotFound(session_name.to_string()))?;
        self.store.add_message(session_id, sender, content).await?;
        Ok(())
    }

    /// Ingest a batch of document sources into a session.
    pub async fn ingest(
        &self,
        session_name: &str,
        sources: Vec<DocumentSource>,
    ) -> Result<IngestOutcome, IngestError> {
        let pipeline = IngestionPipeline::new(
            &self.store,
            &self.index,
            self.embedder.as_ref(),
            self.embedding_dimension as u64,
        );
        pipeline.ingest(session_name, sources).await
    }

    /// Answer a question against a session, returning the fragment stream.
    ///
    /// Runs the full router pipeline: memory fetch, session resolution, similarity search,
    /// threshold filtering, and prompt composition. Backend failures propagate without
    /// retry at this layer. The returned stream performs no persistence.
    pub async fn ask(
        &self,
        session_name: &str,
        question: &str,
        cancel: CancellationToken,
    ) -> Result<AnswerStream, QueryError> {
        let recent = self
            .store
            .last_messages(session_name, prompt::MEMORY_WINDOW)
            .await?;
        let memory = prompt::format_memory(&recent);

        let subject_category = self
            .store
            .subject_category(session_name)
            .await?
            .ok_or_else(|| QueryError::SessionNotFound(session_name.to_string()))?;

        let mut vectors = self.embedder.embed(vec![question.to_string()]).await?;
        let vector = vectors.pop().ok_or(QueryError::EmptyEmbedding)?;
        let candidates = self
            .index
            .search(session_name, vector, self.search_limit)
            .await?;
        let relevant = prompt::filter_by_threshold(candidates, self.score_threshold);
        tracing::debug!(
            session = session_name,
            relevant = relevant.len(),
            threshold = self.score_threshold,
            "Filtered retrieval candidates"
        );
        let context = prompt::build_context(&relevant);

        let composed = prompt::compose(session_name, question, &memory, &context, &subject_category);
        let stream = self.chat.stream_answer(composed, cancel).await?;
        Ok(stream)
    }
}
