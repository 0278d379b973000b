//! Relational record store for sessions, documents, and messages.

mod records;
pub mod types;

pub use records::RecordStore;
pub use types::{DocumentRecord, MessageRecord, SenderRole, SessionRecord, StoreError};
