//! Streaming chat-completion client.
//!
//! Talks to an OpenAI-compatible endpoint (Groq in the reference configuration) and exposes
//! the answer as a lazy, single-pass stream of text fragments. The stream is not
//! restartable; regenerating an answer requires a fresh call. Persistence of the transcript
//! is the caller's job, never this module's.

use std::pin::Pin;

use async_stream::try_stream;
use futures_core::Stream;
use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::Config;

/// Bounded number of additional attempts when the initial request cannot be sent.
const MAX_RETRIES: usize = 2;

/// Errors raised while requesting or decoding a streamed completion.
#[derive(Debug, Error)]
pub enum ChatClientError {
    /// HTTP layer failed before or while receiving the response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Endpoint responded with an unexpected status code.
    #[error("Unexpected chat API response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the endpoint.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// Stream payload could not be decoded.
    #[error("Malformed stream payload: {0}")]
    InvalidResponse(String),
}

/// Composed prompt handed to the model.
#[derive(Debug, Clone)]
pub struct ChatPrompt {
    /// System instructions, including context and decision rules.
    pub system: String,
    /// User turn carrying the question and its inputs.
    pub user: String,
}

/// Lazy sequence of answer fragments; concatenating every item yields the full answer.
pub type AnswerStream = Pin<Box<dyn Stream<Item = Result<String, ChatClientError>> + Send>>;

/// Client for an OpenAI-compatible streaming chat endpoint.
pub struct ChatClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

impl ChatClient {
    /// Construct a client from the supplied configuration.
    ///
    /// The configuration loader has already rejected a missing credential, so construction
    /// only sets up the HTTP transport.
    pub fn new(config: &Config) -> Result<Self, ChatClientError> {
        let http = Client::builder().user_agent("studymate/0.1").build()?;
        Ok(Self {
            http,
            base_url: config.chat_api_url.trim_end_matches('/').to_string(),
            api_key: config.chat_api_key.clone(),
            model: config.chat_model.clone(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    /// Invoke the model in streaming mode and return the fragment stream.
    ///
    /// The request is retried a bounded number of times only while establishing the
    /// connection; once fragments flow, a failure ends the stream with an error item.
    /// Cancelling `cancel` stops consumption and drops the HTTP response, which aborts the
    /// remaining generation on the wire.
    pub async fn stream_answer(
        &self,
        prompt: ChatPrompt,
        cancel: CancellationToken,
    ) -> Result<AnswerStream, ChatClientError> {
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": prompt.system },
                { "role": "user", "content": prompt.user },
            ],
            "temperature": 0,
            "stream": true,
        });

        let mut attempt = 0;
        let response = loop {
            let request = self
                .http
                .post(self.endpoint())
                .bearer_auth(&self.api_key)
                .json(&body);
            match request.send().await {
                Ok(response) => break response,
                Err(error) if attempt < MAX_RETRIES => {
                    attempt += 1;
                    tracing::warn!(attempt, error = %error, "Chat request failed; retrying");
                }
                Err(error) => return Err(error.into()),
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = ChatClientError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Chat request rejected");
            return Err(error);
        }

        let stream: AnswerStream = Box::pin(try_stream! {
            let mut bytes = response.bytes_stream();
            let mut buffer: Vec<u8> = Vec::new();

            'receive: loop {
                let chunk = tokio::select! {
                    biased;
                    () = cancel.cancelled() => {
                        tracing::debug!("Answer stream cancelled by caller");
                        break 'receive;
                    }
                    chunk = bytes.next() => chunk,
                };
                let Some(chunk) = chunk else { break 'receive };
                buffer.extend_from_slice(&chunk.map_err(ChatClientError::Http)?);

                while let Some(newline) = buffer.iter().position(|byte| *byte == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=newline).collect();
                    let line = std::str::from_utf8(&line)
                        .map_err(|error| {
                            ChatClientError::InvalidResponse(format!(
                                "stream is not valid UTF-8: {error}"
                            ))
                        })?
                        .trim();

                    let Some(data) = line.strip_prefix("data:") else {
                        continue;
                    };
                    let data = data.trim();
                    if data == "[DONE]" {
                        break 'receive;
                    }

                    let payload: StreamChunk = serde_json::from_str(data).map_err(|error| {
                        ChatClientError::InvalidResponse(format!(
                            "failed to decode stream chunk: {error}"
                        ))
                    })?;
                    for choice in payload.choices {
                        if let Some(content) = choice.delta.content
                            && !content.is_empty()
                        {
                            yield content;
                        }
                    }
                }
            }
        });

        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    fn client(base_url: String) -> ChatClient {
        ChatClient {
            http: Client::builder()
                .user_agent("studymate-test")
                .build()
                .expect("client"),
            base_url,
            api_key: "test-key".into(),
            model: "qwen/qwen3-32b".into(),
        }
    }

    fn sse_body(fragments: &[&str]) -> String {
        let mut body = String::new();
        for fragment in fragments {
            body.push_str(&format!(
                "data: {}\n\n",
                json!({ "choices": [{ "delta": { "content": fragment } }] })
            ));
        }
        body.push_str("data: [DONE]\n\n");
        body
    }

    async fn collect(stream: AnswerStream) -> String {
        let fragments: Vec<_> = stream.collect().await;
        fragments
            .into_iter()
            .map(|fragment| fragment.expect("fragment"))
            .collect()
    }

    #[tokio::test]
    async fn fragments_concatenate_into_the_full_answer() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/chat/completions")
                    .body_contains("\"stream\":true");
                then.status(200)
                    .header("content-type", "text/event-stream")
                    .body(sse_body(&["Force equals ", "mass times ", "acceleration."]));
            })
            .await;

        let stream = client(server.base_url())
            .stream_answer(
                ChatPrompt {
                    system: "You are StudyMate.".into(),
                    user: "What is Newton's second law?".into(),
                },
                CancellationToken::new(),
            )
            .await
            .expect("stream");

        let answer = collect(stream).await;
        mock.assert();
        assert_eq!(answer, "Force equals mass times acceleration.");
    }

    #[tokio::test]
    async fn role_only_deltas_produce_no_fragments() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(200).body(
                    "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n\
                     data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n\
                     data: [DONE]\n\n",
                );
            })
            .await;

        let stream = client(server.base_url())
            .stream_answer(
                ChatPrompt {
                    system: "s".into(),
                    user: "u".into(),
                },
                CancellationToken::new(),
            )
            .await
            .expect("stream");

        assert_eq!(collect(stream).await, "Hi");
    }

    #[tokio::test]
    async fn rejected_request_surfaces_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(401).body("invalid api key");
            })
            .await;

        let error = match client(server.base_url())
            .stream_answer(
                ChatPrompt {
                    system: "s".into(),
                    user: "u".into(),
                },
                CancellationToken::new(),
            )
            .await
        {
            Ok(_) => panic!("rejected"),
            Err(error) => error,
        };
        match error {
            ChatClientError::UnexpectedStatus { status, .. } => {
                assert_eq!(status, StatusCode::UNAUTHORIZED);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn cancelled_token_ends_the_stream_early() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(200).body(sse_body(&["never", "delivered"]));
            })
            .await;

        let token = CancellationToken::new();
        token.cancel();

        let stream = client(server.base_url())
            .stream_answer(
                ChatPrompt {
                    system: "s".into(),
                    user: "u".into(),
                },
                token,
            )
            .await
            .expect("stream");

        assert_eq!(collect(stream).await, "");
    }
}
