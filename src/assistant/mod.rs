//! Retrieval router and assistant service.
//!
//! Each query is a single sequential pipeline: fetch recent conversation, run similarity
//! search, filter by the relevance threshold, compose the prompt, and hand it to the
//! streaming chat client. Sessions are independent; nothing here coordinates concurrent
//! queries within one session.

pub mod prompt;
mod service;

pub use service::{InitError, QueryError, SessionError, StudyAssistant};
