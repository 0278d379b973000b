use std::io::Write as _;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use studymate::assistant::StudyAssistant;
use studymate::ingest::DocumentSource;
use studymate::store::SenderRole;
use studymate::{config, logging};

#[derive(Parser)]
#[command(
    name = "studymate",
    about = "Session-scoped study assistant over your own documents"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a new study session.
    CreateSession {
        /// Unique session name without whitespace.
        name: String,
        /// Subject category; "General" lifts the topical restriction.
        #[arg(long, default_value = "General")]
        category: String,
    },
    /// List all sessions.
    ListSessions,
    /// Delete a session together with its documents, messages, and vectors.
    DeleteSession {
        /// Session to delete.
        name: String,
    },
    /// List documents attached to a session.
    ListDocuments {
        /// Session to inspect.
        session: String,
    },
    /// Ingest PDF files into a session.
    Ingest {
        /// Target session.
        session: String,
        /// One or more PDF paths.
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Print a session's transcript.
    History {
        /// Session to inspect.
        session: String,
    },
    /// Ask a question and stream the answer.
    Ask {
        /// Session to query.
        session: String,
        /// The question text.
        question: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = config::load().context("Failed to load configuration")?;
    logging::init_tracing();
    let cli = Cli::parse();
    let assistant = StudyAssistant::new(&config)
        .await
        .context("Failed to initialize services")?;

    match cli.command {
        Command::CreateSession { name, category } => {
            assistant.create_session(&name, &category).await?;
            println!("Session '{name}' created under '{category}'.");
        }
        Command::ListSessions => {
            let sessions = assistant.list_sessions().await?;
            if sessions.is_empty() {
                println!("No sessions found.");
            }
            for session in sessions {
                println!(
                    "{}  [{}]  created {}",
                    session.session_name, session.subject_category, session.created_at
                );
            }
        }
        Command::DeleteSession { name } => {
            assistant.delete_session(&name).await?;
            println!("Session '{name}' deleted.");
        }
        Command::ListDocuments { session } => {
            let documents = assistant.list_documents(&session).await?;
            if documents.is_empty() {
                println!("No documents in this session yet.");
            }
            for document in documents {
                println!("{}  ({})", document.doc_name, document.file_path);
            }
        }
        Command::Ingest { session, paths } => {
            let sources = paths.into_iter().map(DocumentSource::Path).collect();
            let outcome = assistant.ingest(&session, sources).await?;
            println!(
                "Ingested {} document(s), skipped {}.",
                outcome.ingested, outcome.skipped
            );
        }
        Command::History { session } => {
            for message in assistant.history(&session).await? {
                let role = match message.sender {
                    SenderRole::User => "User",
                    SenderRole::Assistant => "Assistant",
                };
                println!("{role}: {}", message.content);
            }
        }
        Command::Ask { session, question } => {
            // The question is persisted before streaming starts; the answer after it ends.
            assistant
                .record_message(&session, SenderRole::User, &question)
                .await?;

            let cancel = CancellationToken::new();
            {
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        cancel.cancel();
                    }
                });
            }

            let mut stream = assistant.ask(&session, &question, cancel).await?;
            let mut answer = String::new();
            let mut stdout = std::io::stdout();
            while let Some(fragment) = stream.next().await {
                let fragment = fragment?;
                print!("{fragment}");
                stdout.flush().ok();
                answer.push_str(&fragment);
            }
            println!();

            if !answer.is_empty() {
                assistant
                    .record_message(&session, SenderRole::Assistant, &answer)
                    .await?;
            }
        }
    }

    Ok(())
}
