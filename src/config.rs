use std::env;
use std::path::PathBuf;
use thiserror::Error;

/// Default base URL for the OpenAI-compatible chat completion endpoint.
pub const DEFAULT_CHAT_API_URL: &str = "https://api.groq.com/openai/v1";
/// Default chat model identifier requested from the provider.
pub const DEFAULT_CHAT_MODEL: &str = "qwen/qwen3-32b";
/// Default base URL for the local Ollama embedding runtime.
pub const DEFAULT_EMBEDDING_URL: &str = "http://127.0.0.1:11434";
/// Default number of candidates requested from similarity search.
pub const DEFAULT_SEARCH_LIMIT: usize = 5;
/// Default relevance threshold applied to similarity scores.
pub const DEFAULT_SCORE_THRESHOLD: f32 = 0.75;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the StudyMate services.
///
/// Built once via [`Config::from_env`] (or a struct literal in tests) and passed
/// explicitly into each service constructor; there is no process-wide cache.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path of the SQLite database holding sessions, documents, and messages.
    pub database_path: PathBuf,
    /// Base URL of the Qdrant instance that stores embedded chunks.
    pub qdrant_url: String,
    /// Optional API key required to access Qdrant.
    pub qdrant_api_key: Option<String>,
    /// Embedding backend used to generate vector representations.
    pub embedding_provider: EmbeddingProvider,
    /// Base URL of the Ollama runtime serving embeddings.
    pub embedding_url: String,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Base URL of the OpenAI-compatible chat completion API.
    pub chat_api_url: String,
    /// Credential for the chat completion API. Absence is fatal at load time.
    pub chat_api_key: String,
    /// Chat model identifier requested for answer generation.
    pub chat_model: String,
    /// Number of candidates requested from similarity search.
    pub search_limit: usize,
    /// Relevance threshold compared against similarity scores with `>=`.
    pub score_threshold: f32,
}

/// Supported embedding backends for the ingestion and retrieval pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmbeddingProvider {
    /// Local Ollama runtime.
    Ollama,
    /// Deterministic offline encoder, useful without a running backend.
    Offline,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            database_path: load_env_optional("DATABASE_PATH")
                .map_or_else(|| PathBuf::from("studymate.db"), PathBuf::from),
            qdrant_url: load_env("QDRANT_URL")?,
            qdrant_api_key: load_env_optional("QDRANT_API_KEY"),
            embedding_provider: load_env_optional("EMBEDDING_PROVIDER")
                .map(|value| {
                    value.parse().map_err(|()| {
                        ConfigError::InvalidValue("EMBEDDING_PROVIDER".to_string())
                    })
                })
                .transpose()?
                .unwrap_or(EmbeddingProvider::Ollama),
            embedding_url: load_env_optional("EMBEDDING_URL")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_URL.to_string()),
            embedding_model: load_env("EMBEDDING_MODEL")?,
            embedding_dimension: load_env("EMBEDDING_DIMENSION")?
                .parse()
                .map_err(|_| ConfigError::InvalidValue("EMBEDDING_DIMENSION".to_string()))?,
            chat_api_url: load_env_optional("CHAT_API_URL")
                .unwrap_or_else(|| DEFAULT_CHAT_API_URL.to_string()),
            chat_api_key: load_env("GROQ_API_KEY")?,
            chat_model: load_env_optional("CHAT_MODEL")
                .unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
            search_limit: load_env_optional("SEARCH_LIMIT")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue("SEARCH_LIMIT".into()))
                })
                .transpose()?
                .unwrap_or(DEFAULT_SEARCH_LIMIT),
            score_threshold: load_env_optional("SEARCH_SCORE_THRESHOLD")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue("SEARCH_SCORE_THRESHOLD".into()))
                })
                .transpose()?
                .unwrap_or(DEFAULT_SCORE_THRESHOLD),
        })
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "offline" => Ok(Self::Offline),
            _ => Err(()),
        }
    }
}

/// Load `.env` if present, then build a [`Config`] from the environment.
pub fn load() -> Result<Config, ConfigError> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    tracing::debug!(
        database = %config.database_path.display(),
        qdrant_url = %config.qdrant_url,
        embedding_provider = ?config.embedding_provider,
        chat_model = %config.chat_model,
        "Loaded configuration"
    );
    Ok(config)
}
