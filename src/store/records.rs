//! SQLite-backed record store.
//!
//! Pure data access: every mutating operation commits before returning, and lookups report
//! misses as empty results rather than errors so calling logic stays side-effect-free on
//! miss. Cascading deletes run as independent statements in a fixed order (messages, then
//! documents, then the session row) with no surrounding transaction.

use std::path::Path;
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use super::types::{DocumentRecord, MessageRecord, SenderRole, SessionRecord, StoreError};

const CREATE_SESSIONS: &str = "CREATE TABLE IF NOT EXISTS sessions (
    session_id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_name TEXT NOT NULL UNIQUE,
    subject_category TEXT NOT NULL,
    created_at TEXT NOT NULL
)";

const CREATE_DOCUMENTS: &str = "CREATE TABLE IF NOT EXISTS documents (
    doc_id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id INTEGER NOT NULL,
    doc_name TEXT NOT NULL,
    file_path TEXT NOT NULL,
    FOREIGN KEY(session_id) REFERENCES sessions(session_id)
)";

const CREATE_MESSAGES: &str = "CREATE TABLE IF NOT EXISTS messages (
    message_id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id INTEGER NOT NULL,
    sender TEXT NOT NULL,
    content TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    FOREIGN KEY(session_id) REFERENCES sessions(session_id)
)";

/// Pool-backed store for session, document, and message rows.
#[derive(Clone)]
pub struct RecordStore {
    pool: Pool<Sqlite>,
}

impl RecordStore {
    /// Open (creating if missing) the database at `path` and ensure the schema exists.
    ///
    /// The literal path `:memory:` opens a private in-memory database instead.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if path == Path::new(":memory:") {
            return Self::open_in_memory().await;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        let store = Self { pool };
        store.ensure_schema().await?;
        tracing::debug!(database = %path.display(), "Record store ready");
        Ok(store)
    }

    /// Open a private in-memory database, mainly for tests.
    ///
    /// The pool is pinned to a single connection: each SQLite connection would otherwise
    /// see its own empty in-memory database.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(StoreError::from)?
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(CREATE_SESSIONS).execute(&self.pool).await?;
        sqlx::query(CREATE_DOCUMENTS).execute(&self.pool).await?;
        sqlx::query(CREATE_MESSAGES).execute(&self.pool).await?;
        Ok(())
    }

    /// Insert a new session row, returning its id, or `None` when the name is taken.
    pub async fn create_session(
        &self,
        session_name: &str,
        subject_category: &str,
    ) -> Result<Option<i64>, StoreError> {
        if self.session_exists(session_name).await? {
            return Ok(None);
        }

        let result = sqlx::query(
            "INSERT INTO sessions (session_name, subject_category, created_at) VALUES (?, ?, ?)",
        )
        .bind(session_name)
        .bind(subject_category)
        .bind(now_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(Some(result.last_insert_rowid()))
    }

    /// Whether a session with this name exists.
    pub async fn session_exists(&self, session_name: &str) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT 1 FROM sessions WHERE session_name = ?")
            .bind(session_name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    /// All sessions in creation order.
    pub async fn list_sessions(&self) -> Result<Vec<SessionRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT session_id, session_name, subject_category, created_at
             FROM sessions ORDER BY session_id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_session).collect()
    }

    /// Resolve a session name to its id; `None` on miss.
    pub async fn session_id(&self, session_name: &str) -> Result<Option<i64>, StoreError> {
        let row = sqlx::query("SELECT session_id FROM sessions WHERE session_name = ?")
            .bind(session_name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| row.get(0)))
    }

    /// Fetch a session's subject category; `None` on miss.
    pub async fn subject_category(&self, session_name: &str) -> Result<Option<String>, StoreError> {
        let row = sqlx::query("SELECT subject_category FROM sessions WHERE session_name = ?")
            .bind(session_name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| row.get(0)))
    }

    /// Delete a session and its owned rows: messages, then documents, then the session.
    ///
    /// Returns `false` without side effects when the session does not exist. A crash
    /// between statements can leave orphans; the caller removes the vector collection
    /// afterwards, so that gap extends across stores as well.
    pub async fn delete_session(&self, session_name: &str) -> Result<bool, StoreError> {
        let Some(session_id) = self.session_id(session_name).await? else {
            return Ok(false);
        };

        let messages = sqlx::query("DELETE FROM messages WHERE session_id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        let documents = sqlx::query("DELETE FROM documents WHERE session_id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        sqlx::query("DELETE FROM sessions WHERE session_id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        tracing::debug!(session = session_name, messages, documents, "Session rows deleted");
        Ok(true)
    }

    /// Insert one document record, returning its id.
    pub async fn add_document(
        &self,
        session_id: i64,
        doc_name: &str,
        file_path: &str,
    ) -> Result<i64, StoreError> {
        let result =
            sqlx::query("INSERT INTO documents (session_id, doc_name, file_path) VALUES (?, ?, ?)")
                .bind(session_id)
                .bind(doc_name)
                .bind(file_path)
                .execute(&self.pool)
                .await?;
        Ok(result.last_insert_rowid())
    }

    /// Insert several document records for one session.
    pub async fn add_documents_bulk(
        &self,
        session_id: i64,
        documents: &[(String, String)],
    ) -> Result<(), StoreError> {
        for (doc_name, file_path) in documents {
            self.add_document(session_id, doc_name, file_path).await?;
        }
        Ok(())
    }

    /// All documents attached to a session, in ingestion order.
    pub async fn list_documents(&self, session_id: i64) -> Result<Vec<DocumentRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT doc_id, session_id, doc_name, file_path
             FROM documents WHERE session_id = ? ORDER BY doc_id",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_document).collect()
    }

    /// Append a message to a session's transcript, returning its id.
    pub async fn add_message(
        &self,
        session_id: i64,
        sender: SenderRole,
        content: &str,
    ) -> Result<i64, StoreError> {
        let result = sqlx::query(
            "INSERT INTO messages (session_id, sender, content, timestamp) VALUES (?, ?, ?, ?)",
        )
        .bind(session_id)
        .bind(sender.as_str())
        .bind(content)
        .bind(now_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Full transcript for a session, oldest first.
    pub async fn list_messages(&self, session_id: i64) -> Result<Vec<MessageRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT message_id, session_id, sender, content, timestamp
             FROM messages WHERE session_id = ? ORDER BY timestamp, message_id",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_message).collect()
    }

    /// The most recent message in a session, if any.
    pub async fn latest_message(
        &self,
        session_id: i64,
    ) -> Result<Option<MessageRecord>, StoreError> {
        let row = sqlx::query(
            "SELECT message_id, session_id, sender, content, timestamp
             FROM messages WHERE session_id = ? ORDER BY message_id DESC LIMIT 1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_message).transpose()
    }

    /// The last `k` messages for a session, resolved by name and delivered oldest first.
    ///
    /// Recency is taken from the insertion identifier; the fetched window is reversed so
    /// callers receive chronological order. Returns fewer than `k` rows (possibly none)
    /// when the transcript is shorter or the session is unknown.
    pub async fn last_messages(
        &self,
        session_name: &str,
        k: usize,
    ) -> Result<Vec<MessageRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT m.message_id, m.session_id, m.sender, m.content, m.timestamp
             FROM messages m
             JOIN sessions s ON m.session_id = s.session_id
             WHERE s.session_name = ?
             ORDER BY m.message_id DESC
             LIMIT ?",
        )
        .bind(session_name)
        .bind(k as i64)
        .fetch_all(&self.pool)
        .await?;
        let mut messages = rows
            .iter()
            .map(row_to_message)
            .collect::<Result<Vec<_>, _>>()?;
        messages.reverse();
        Ok(messages)
    }
}

fn row_to_session(row: &SqliteRow) -> Result<SessionRecord, StoreError> {
    Ok(SessionRecord {
        session_id: row.try_get("session_id")?,
        session_name: row.try_get("session_name")?,
        subject_category: row.try_get("subject_category")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_document(row: &SqliteRow) -> Result<DocumentRecord, StoreError> {
    Ok(DocumentRecord {
        doc_id: row.try_get("doc_id")?,
        session_id: row.try_get("session_id")?,
        doc_name: row.try_get("doc_name")?,
        file_path: row.try_get("file_path")?,
    })
}

fn row_to_message(row: &SqliteRow) -> Result<MessageRecord, StoreError> {
    let sender: String = row.try_get("sender")?;
    Ok(MessageRecord {
        message_id: row.try_get("message_id")?,
        session_id: row.try_get("session_id")?,
        sender: SenderRole::parse(&sender)?,
        content: row.try_get("content")?,
        timestamp: row.try_get("timestamp")?,
    })
}

/// Current timestamp formatted for row storage.
fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> RecordStore {
        RecordStore::open_in_memory().await.expect("in-memory store")
    }

    #[tokio::test]
    async fn duplicate_session_name_is_not_created_twice() {
        let store = store().await;
        let first = store.create_session("physics101", "Physics").await.unwrap();
        assert!(first.is_some());

        let second = store.create_session("physics101", "Physics").await.unwrap();
        assert!(second.is_none());

        let sessions = store.list_sessions().await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].session_name, "physics101");
    }

    #[tokio::test]
    async fn lookups_report_misses_as_absent() {
        let store = store().await;
        assert!(!store.session_exists("ghost").await.unwrap());
        assert!(store.session_id("ghost").await.unwrap().is_none());
        assert!(store.subject_category("ghost").await.unwrap().is_none());
        assert!(store.last_messages("ghost", 6).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn subject_category_round_trips() {
        let store = store().await;
        store.create_session("chem1", "Chemistry").await.unwrap();
        assert_eq!(
            store.subject_category("chem1").await.unwrap().as_deref(),
            Some("Chemistry")
        );
    }

    #[tokio::test]
    async fn last_messages_caps_and_orders_chronologically() {
        let store = store().await;
        let id = store
            .create_session("hist1", "General")
            .await
            .unwrap()
            .unwrap();
        for n in 0..8 {
            let role = if n % 2 == 0 {
                SenderRole::User
            } else {
                SenderRole::Assistant
            };
            store
                .add_message(id, role, &format!("message {n}"))
                .await
                .unwrap();
        }

        let window = store.last_messages("hist1", 6).await.unwrap();
        assert_eq!(window.len(), 6);
        let contents: Vec<_> = window.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(
            contents,
            vec![
                "message 2",
                "message 3",
                "message 4",
                "message 5",
                "message 6",
                "message 7"
            ]
        );
        for pair in window.windows(2) {
            assert!(pair[0].timestamp <= pair[1].timestamp);
        }
    }

    #[tokio::test]
    async fn latest_message_returns_newest_row() {
        let store = store().await;
        let id = store
            .create_session("latest", "General")
            .await
            .unwrap()
            .unwrap();
        assert!(store.latest_message(id).await.unwrap().is_none());

        store
            .add_message(id, SenderRole::User, "first")
            .await
            .unwrap();
        store
            .add_message(id, SenderRole::Assistant, "second")
            .await
            .unwrap();
        let latest = store.latest_message(id).await.unwrap().unwrap();
        assert_eq!(latest.content, "second");
        assert_eq!(latest.sender, SenderRole::Assistant);
    }

    #[tokio::test]
    async fn delete_session_cascades_and_reports_misses() {
        let store = store().await;
        let id = store
            .create_session("doomed", "Physics")
            .await
            .unwrap()
            .unwrap();
        store
            .add_document(id, "notes.pdf", "/tmp/notes.pdf")
            .await
            .unwrap();
        store
            .add_message(id, SenderRole::User, "hello")
            .await
            .unwrap();

        assert!(store.delete_session("doomed").await.unwrap());
        assert!(!store.session_exists("doomed").await.unwrap());
        assert!(store.list_documents(id).await.unwrap().is_empty());
        assert!(store.list_messages(id).await.unwrap().is_empty());

        assert!(!store.delete_session("doomed").await.unwrap());
    }

    #[tokio::test]
    async fn bulk_document_insert_lists_in_order() {
        let store = store().await;
        let id = store
            .create_session("docs", "General")
            .await
            .unwrap()
            .unwrap();
        store
            .add_documents_bulk(
                id,
                &[
                    ("a.pdf".to_string(), "/tmp/a.pdf".to_string()),
                    ("b.pdf".to_string(), "in-memory://b.pdf".to_string()),
                ],
            )
            .await
            .unwrap();

        let documents = store.list_documents(id).await.unwrap();
        let names: Vec<_> = documents.iter().map(|d| d.doc_name.as_str()).collect();
        assert_eq!(names, vec!["a.pdf", "b.pdf"]);
    }
}
