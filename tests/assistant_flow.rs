//! End-to-end flows over the assistant service with mocked Qdrant and chat backends.

use futures_util::StreamExt;
use httpmock::{Method::DELETE, Method::GET, Method::POST, Method::PUT, MockServer};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use studymate::assistant::prompt::REFUSAL_SENTENCE;
use studymate::assistant::{QueryError, SessionError, StudyAssistant};
use studymate::chat::AnswerStream;
use studymate::config::{Config, EmbeddingProvider};
use studymate::ingest::DocumentSource;
use studymate::store::SenderRole;

const DIMENSION: usize = 8;

fn test_config(qdrant: &MockServer, chat: &MockServer) -> Config {
    Config {
        database_path: ":memory:".into(),
        qdrant_url: qdrant.base_url(),
        qdrant_api_key: None,
        embedding_provider: EmbeddingProvider::Offline,
        embedding_url: String::new(),
        embedding_model: "offline".into(),
        embedding_dimension: DIMENSION,
        chat_api_url: chat.base_url(),
        chat_api_key: "test-key".into(),
        chat_model: "qwen/qwen3-32b".into(),
        search_limit: 5,
        score_threshold: 0.75,
    }
}

async fn assistant(qdrant: &MockServer, chat: &MockServer) -> StudyAssistant {
    StudyAssistant::new(&test_config(qdrant, chat))
        .await
        .expect("assistant")
}

/// Let collection management for one session succeed: lookups miss, creation works.
async fn mock_collection(qdrant: &MockServer, name: &str) {
    let path = format!("/collections/{name}");
    {
        let path = path.clone();
        qdrant
            .mock_async(move |when, then| {
                when.method(GET).path(path);
                then.status(404);
            })
            .await;
    }
    qdrant
        .mock_async(move |when, then| {
            when.method(PUT).path(path);
            then.status(200).json_body(json!({"result": true}));
        })
        .await;
}

fn sse_answer(fragments: &[&str]) -> String {
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

fn sample_pdf(line: &str) -> Vec<u8> {
    use lopdf::content::{Content, Operation};
    use lopdf::{Document, Object, Stream, dictionary};

    let mut document = Document::with_version("1.5");
    let pages_id = document.new_object_id();
    let font_id = document.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = document.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });
    let content = Content {
        operations: vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 12.into()]),
            Operation::new("Td", vec![50.into(), 700.into()]),
            Operation::new("Tj", vec![Object::string_literal(line)]),
            Operation::new("ET", vec![]),
        ],
    };
    let content_id = document.add_object(Stream::new(
        dictionary! {},
        content.encode().expect("encode content"),
    ));
    let page_id = document.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => vec![page_id.into()],
        "Count" => 1,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
    };
    document.objects.insert(pages_id, Object::Dictionary(pages));
    let catalog_id = document.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    document.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    document.save_to(&mut bytes).expect("serialize pdf");
    bytes
}

const NEWTON: &str =
    "Newton's second law states that force equals mass times acceleration.";

#[tokio::test]
async fn grounded_question_uses_context_and_persists_the_transcript() {
    let qdrant = MockServer::start_async().await;
    let chat = MockServer::start_async().await;
    mock_collection(&qdrant, "physics101").await;

    let insert = qdrant
        .mock_async(|when, then| {
            when.method(PUT)
                .path("/collections/physics101/points")
                .body_contains("force equals mass times acceleration");
            then.status(200).json_body(json!({"result": {}}));
        })
        .await;
    qdrant
        .mock_async(|when, then| {
            when.method(POST).path("/collections/physics101/points/query");
            then.status(200).json_body(json!({
                "result": [
                    { "id": "chunk-1", "score": 0.92, "payload": {
                        "text": NEWTON, "doc_name": "mechanics.pdf", "page": 0
                    }}
                ]
            }));
        })
        .await;
    let completion = chat
        .mock_async(|when, then| {
            when.method(POST)
                .path("/chat/completions")
                .body_contains("force equals mass times acceleration");
            then.status(200)
                .header("content-type", "text/event-stream")
                .body(sse_answer(&["Force equals ", "mass times acceleration."]));
        })
        .await;

    let assistant = assistant(&qdrant, &chat).await;
    assistant
        .create_session("physics101", "Physics")
        .await
        .expect("create session");
    let outcome = assistant
        .ingest(
            "physics101",
            vec![DocumentSource::Memory {
                name: "mechanics.pdf".into(),
                bytes: sample_pdf(NEWTON),
            }],
        )
        .await
        .expect("ingest");
    assert_eq!(outcome.ingested, 1);
    insert.assert();

    let question = "What is Newton's second law?";
    assistant
        .record_message("physics101", SenderRole::User, question)
        .await
        .expect("persist question");
    let stream = assistant
        .ask("physics101", question, CancellationToken::new())
        .await
        .expect("ask");
    let answer = collect(stream).await;
    assert!(!answer.is_empty());
    assistant
        .record_message("physics101", SenderRole::Assistant, &answer)
        .await
        .expect("persist answer");

    // The filtered context reached the model verbatim.
    completion.assert();

    let transcript = assistant.history("physics101").await.expect("history");
    assert_eq!(transcript.len(), 2);
    assert_eq!(transcript[0].sender, SenderRole::User);
    assert_eq!(transcript[0].content, question);
    assert_eq!(transcript[1].sender, SenderRole::Assistant);
    assert!(!transcript[1].content.is_empty());
}

#[tokio::test]
async fn creating_the_same_session_twice_reports_failure_and_keeps_one_row() {
    let qdrant = MockServer::start_async().await;
    let chat = MockServer::start_async().await;
    mock_collection(&qdrant, "physics101").await;

    let assistant = assistant(&qdrant, &chat).await;
    assistant
        .create_session("physics101", "Physics")
        .await
        .expect("first create");
    let error = assistant
        .create_session("physics101", "Physics")
        .await
        .expect_err("second create");
    assert!(matches!(error, SessionError::AlreadyExists(name) if name == "physics101"));

    let sessions = assistant.list_sessions().await.expect("sessions");
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].session_name, "physics101");
}

#[tokio::test]
async fn deleting_a_session_removes_rows_and_the_collection() {
    let qdrant = MockServer::start_async().await;
    let chat = MockServer::start_async().await;
    mock_collection(&qdrant, "doomed").await;
    qdrant
        .mock_async(|when, then| {
            when.method(PUT).path("/collections/doomed/points");
            then.status(200).json_body(json!({"result": {}}));
        })
        .await;
    let collection_delete = qdrant
        .mock_async(|when, then| {
            when.method(DELETE).path("/collections/doomed");
            then.status(200).json_body(json!({"result": true}));
        })
        .await;

    let assistant = assistant(&qdrant, &chat).await;
    assistant
        .create_session("doomed", "Physics")
        .await
        .expect("create");
    assistant
        .ingest(
            "doomed",
            vec![DocumentSource::Memory {
                name: "notes.pdf".into(),
                bytes: sample_pdf("Some notes about momentum."),
            }],
        )
        .await
        .expect("ingest");
    assistant
        .record_message("doomed", SenderRole::User, "hello")
        .await
        .expect("message");

    assistant.delete_session("doomed").await.expect("delete");
    collection_delete.assert();

    let error = match assistant
        .ask("doomed", "anything?", CancellationToken::new())
        .await
    {
        Ok(_) => panic!("query deleted session"),
        Err(error) => error,
    };
    assert!(matches!(error, QueryError::SessionNotFound(name) if name == "doomed"));

    let error = assistant.delete_session("doomed").await.expect_err("gone");
    assert!(matches!(error, SessionError::NotFound(_)));
}

#[tokio::test]
async fn general_sessions_fall_back_to_general_knowledge_without_context() {
    let qdrant = MockServer::start_async().await;
    let chat = MockServer::start_async().await;
    mock_collection(&qdrant, "general1").await;
    qdrant
        .mock_async(|when, then| {
            when.method(POST).path("/collections/general1/points/query");
            then.status(200).json_body(json!({ "result": [] }));
        })
        .await;
    let completion = chat
        .mock_async(|when, then| {
            when.method(POST)
                .path("/chat/completions")
                .body_contains("Session Subject Category: General");
            then.status(200)
                .body(sse_answer(&["The capital of France is Paris."]));
        })
        .await;

    let assistant = assistant(&qdrant, &chat).await;
    assistant
        .create_session("general1", "General")
        .await
        .expect("create");

    let stream = assistant
        .ask(
            "general1",
            "What is the capital of France?",
            CancellationToken::new(),
        )
        .await
        .expect("ask");
    let answer = collect(stream).await;

    completion.assert();
    assert!(!answer.is_empty());
    assert_ne!(answer, REFUSAL_SENTENCE);
}

#[tokio::test]
async fn off_topic_questions_in_a_restricted_session_get_the_refusal_sentence() {
    let qdrant = MockServer::start_async().await;
    let chat = MockServer::start_async().await;
    mock_collection(&qdrant, "chem1").await;
    qdrant
        .mock_async(|when, then| {
            when.method(POST).path("/collections/chem1/points/query");
            then.status(200).json_body(json!({ "result": [] }));
        })
        .await;
    chat.mock_async(|when, then| {
        when.method(POST)
            .path("/chat/completions")
            .body_contains("Chemistry");
        then.status(200).body(sse_answer(&[REFUSAL_SENTENCE]));
    })
    .await;

    let assistant = assistant(&qdrant, &chat).await;
    assistant
        .create_session("chem1", "Chemistry")
        .await
        .expect("create");

    let stream = assistant
        .ask(
            "chem1",
            "How do neutron stars form?",
            CancellationToken::new(),
        )
        .await
        .expect("ask");
    assert_eq!(collect(stream).await, REFUSAL_SENTENCE);
}

#[tokio::test]
async fn recent_conversation_is_blended_into_the_prompt() {
    let qdrant = MockServer::start_async().await;
    let chat = MockServer::start_async().await;
    mock_collection(&qdrant, "memory1").await;
    qdrant
        .mock_async(|when, then| {
            when.method(POST).path("/collections/memory1/points/query");
            then.status(200).json_body(json!({ "result": [] }));
        })
        .await;
    let completion = chat
        .mock_async(|when, then| {
            when.method(POST)
                .path("/chat/completions")
                .body_contains("User: What is torque?")
                .body_contains("Assistant: A rotational force.");
            then.status(200).body(sse_answer(&["As discussed, torque."]));
        })
        .await;

    let assistant = assistant(&qdrant, &chat).await;
    assistant
        .create_session("memory1", "Physics")
        .await
        .expect("create");
    assistant
        .record_message("memory1", SenderRole::User, "What is torque?")
        .await
        .expect("user turn");
    assistant
        .record_message("memory1", SenderRole::Assistant, "A rotational force.")
        .await
        .expect("assistant turn");

    let stream = assistant
        .ask("memory1", "Can you expand on that?", CancellationToken::new())
        .await
        .expect("ask");
    collect(stream).await;
    completion.assert();
}
