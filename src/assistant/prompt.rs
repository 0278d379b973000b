//! Prompt assembly for the retrieval router.
//!
//! The router's job ends at supplying accurate context, memory, and subject category; the
//! decision between answering from context, falling back to general knowledge, or refusing
//! is encoded in the template and delegated to the model's adherence to it.

use crate::chat::ChatPrompt;
use crate::store::{MessageRecord, SenderRole};
use crate::vector::ScoredChunk;

/// Exact refusal sentence the model is instructed to emit for out-of-scope questions.
pub const REFUSAL_SENTENCE: &str = "I don't know. No relevant information found.";

/// Number of recent messages blended into each query as conversational memory.
pub const MEMORY_WINDOW: usize = 6;

/// Format recent messages as alternating `User:`/`Assistant:` lines, oldest first.
pub(crate) fn format_memory(messages: &[MessageRecord]) -> String {
    let mut memory = String::new();
    for message in messages {
        let role = match message.sender {
            SenderRole::User => "User",
            SenderRole::Assistant => "Assistant",
        };
        memory.push_str(role);
        memory.push_str(": ");
        memory.push_str(&message.content);
        memory.push('\n');
    }
    memory
}

/// Keep candidates whose similarity score meets the threshold.
///
/// Scores are cosine similarities (larger is more relevant), so the comparison is `>=`;
/// raising the threshold can only shrink the surviving set.
pub(crate) fn filter_by_threshold(
    candidates: Vec<ScoredChunk>,
    threshold: f32,
) -> Vec<ScoredChunk> {
    candidates
        .into_iter()
        .filter(|candidate| candidate.score >= threshold)
        .collect()
}

/// Join surviving chunk texts with blank-line separators; empty when none survive.
pub(crate) fn build_context(chunks: &[ScoredChunk]) -> String {
    chunks
        .iter()
        .map(|chunk| chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Compose the final prompt from the assembled inputs.
pub(crate) fn compose(
    session_name: &str,
    question: &str,
    memory: &str,
    context: &str,
    subject_category: &str,
) -> ChatPrompt {
    let system = format!(
        "You are StudyMate, an AI educational assistant.\n\
         \n\
         TASK:\n\
         1. First, check if the provided context documents contain the answer to the user's question.\n\
            - If yes, answer the question using only the context, in natural, clear language.\n\
            - Step-by-step or bullet points are fine if needed.\n\
         2. If the answer is not in the context, check if the question is closely related to the session's subject category ({subject_category}).\n\
            - If yes, answer the question using general knowledge, without referencing the context.\n\
            - If the subject category is \"General\", treat every question as related and answer it normally.\n\
            - If no, respond exactly: \"{refusal}\"\n\
         \n\
         INPUTS:\n\
         - Session Name: {session_name}\n\
         - Past Conversation: {memory}\n\
         - Context Documents: {context}\n\
         - User Question: {question}\n\
         - Session Subject Category: {subject_category}\n\
         \n\
         RULES:\n\
         - Never invent answers from context if it is not present.\n\
         - Always follow the decision process strictly.\n\
         - Keep your answer concise, clear, and relevant.",
        refusal = REFUSAL_SENTENCE,
    );
    let user =
        format!("Question: {question}\nContext: {context}\nPast Conversation: {memory}");
    ChatPrompt { system, user }
}
