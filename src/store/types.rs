//! Shared types used by the record store.

use thiserror::Error;

/// Errors returned by record store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying SQLite operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    /// A message row carried a sender value outside the known roles.
    #[error("Unknown sender role: {0}")]
    UnknownSender(String),
}

/// Role attached to a persisted message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderRole {
    /// Message written by the person asking questions.
    User,
    /// Message produced by the assistant.
    Assistant,
}

impl SenderRole {
    /// Database representation of the role.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    pub(crate) fn parse(value: &str) -> Result<Self, StoreError> {
        match value {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            other => Err(StoreError::UnknownSender(other.to_string())),
        }
    }
}

/// Persisted session row.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    /// Primary key assigned by SQLite.
    pub session_id: i64,
    /// Unique session name chosen by the user.
    pub session_name: String,
    /// Free-form subject label; `"General"` lifts the topical restriction.
    pub subject_category: String,
    /// Creation timestamp in RFC3339.
    pub created_at: String,
}

/// Persisted document row. Created during ingestion and never mutated.
#[derive(Debug, Clone)]
pub struct DocumentRecord {
    /// Primary key assigned by SQLite.
    pub doc_id: i64,
    /// Owning session.
    pub session_id: i64,
    /// Display name of the document.
    pub doc_name: String,
    /// Filesystem path or in-memory origin marker.
    pub file_path: String,
}

/// Persisted message row. Immutable once written.
#[derive(Debug, Clone)]
pub struct MessageRecord {
    /// Primary key assigned by SQLite; insertion order.
    pub message_id: i64,
    /// Owning session.
    pub session_id: i64,
    /// Who wrote the message.
    pub sender: SenderRole,
    /// Message text.
    pub content: String,
    /// Write timestamp in RFC3339.
    pub timestamp: String,
}
