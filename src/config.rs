use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use std::fmt;

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub ai: AiConfig,
    pub telegram: TelegramConfig,
    pub embedding: EmbeddingConfig,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub query: QueryConfig,
    pub indexing: IndexingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub user: String,
    #[serde(skip_serializing)]
    #[serde(default = "DatabaseConfig::default_password")]
    pub password: SecretString,
    pub host: String,
    pub port: u16,
    pub database: String,
}

impl Config {
    /// Load configuration from environment variables, with defaults.
    pub fn load() -> Result<Self, config::ConfigError> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default())?)
            // Override with environment variables using `CHATLORE` prefix and `__` separator
            // e.g., CHATLORE__DATABASE__USER="my_user" or CHATLORE__AI__EMBEDDING_DIMENSION
            .add_source(
                config::Environment::with_prefix("CHATLORE")
                    .prefix_separator("__")
                    .separator("__"), // Use double underscore consistently for prefix and nesting
            )
            .build()?;

        let config: Config = config.try_deserialize()?;

        config.validate().map_err(|e| {
            config::ConfigError::Message(format!("Configuration validation failed: {}", e))
        })?;

        Ok(config)
    }

    /// Validates cross-field constraints the type system cannot express.
    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        if self.ai.embedding_dimension == 0 {
            return Err("CHATLORE__AI__EMBEDDING_DIMENSION must be greater than zero".into());
        }

        if self.retrieval.k == 0 || self.retrieval.k > RetrievalConfig::MAX_K {
            return Err(format!(
                "CHATLORE__RETRIEVAL__K must be between 1 and {} (got {})",
                RetrievalConfig::MAX_K,
                self.retrieval.k
            )
            .into());
        }

        if self.chunking.chunk_overlap_chars >= self.chunking.chunk_size_chars {
            return Err(format!(
                "Chunk overlap ({}) must be smaller than chunk size ({})",
                self.chunking.chunk_overlap_chars, self.chunking.chunk_size_chars
            )
            .into());
        }

        if self.chunking.group_max_chars > self.chunking.chunk_size_chars {
            return Err(format!(
                "Group budget ({}) must not exceed chunk size ({})",
                self.chunking.group_max_chars, self.chunking.chunk_size_chars
            )
            .into());
        }

        if self.embedding.batch_size == 0 || self.embedding.concurrency == 0 {
            return Err(
                "Embedding batch size and concurrency must both be greater than zero".into(),
            );
        }

        if self.query.max_length == 0 {
            return Err("CHATLORE__QUERY__MAX_LENGTH must be greater than zero".into());
        }

        Ok(())
    }
}

impl DatabaseConfig {
    fn default_password() -> SecretString {
        SecretString::from("password".to_string())
    }

    /// Constructs the database connection string.
    pub fn connection_string(&self) -> SecretString {
        SecretString::from(format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user,
            self.password.expose_secret(),
            self.host,
            self.port,
            self.database
        ))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host address to bind to (default: "0.0.0.0")
    pub host: String,
    /// Port to listen on (default: 3000)
    pub port: u16,
}

/// Provider endpoint settings for the embedding and answer models.
///
/// Both models are served from one OpenAI-compatible endpoint. The embedding
/// dimension is a deployment constant: changing it invalidates every stored
/// vector and requires a full re-index.
#[derive(Clone, Deserialize, Serialize)]
pub struct AiConfig {
    /// Base URL of the OpenAI-compatible API
    pub api_base_url: String,
    /// API key for the provider
    #[serde(skip_serializing)]
    #[serde(default = "AiConfig::default_api_key")]
    pub api_key: SecretString,
    /// Embedding model name
    pub embedding_model: String,
    /// Dimension enforced on every stored and queried vector
    pub embedding_dimension: usize,
    /// Completion model used by the answer composer
    pub completion_model: String,
    /// Per-request timeout for provider calls, in seconds
    pub request_timeout_seconds: u64,
    /// Output token cap for answer completions
    pub answer_max_output_tokens: u32,
}

// Custom Debug implementation to redact secrets
impl fmt::Debug for AiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AiConfig")
            .field("api_base_url", &self.api_base_url)
            .field("api_key", &"<REDACTED>")
            .field("embedding_model", &self.embedding_model)
            .field("embedding_dimension", &self.embedding_dimension)
            .field("completion_model", &self.completion_model)
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .field("answer_max_output_tokens", &self.answer_max_output_tokens)
            .finish()
    }
}

impl AiConfig {
    fn default_api_key() -> SecretString {
        SecretString::from(String::new())
    }
}

/// Settings for the Telegram fetch bridge the indexer consumes.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelegramConfig {
    /// Base URL of the fetch bridge service. Empty disables indexing.
    pub bridge_url: String,
    /// Per-request timeout for bridge calls, in seconds
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Chunks per provider call (default: 64)
    pub batch_size: usize,
    /// Maximum in-flight provider calls (default: 4)
    pub concurrency: usize,
    /// Retry cap for transient provider failures (default: 5)
    pub max_retries: u32,
    /// Backpressure ceiling: total chunks queued across batches
    pub max_pending_chunks: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChunkingConfig {
    /// Maximum characters per emitted chunk (default: 500)
    pub chunk_size_chars: usize,
    /// Overlap between adjacent chunks of a split group (default: 100)
    pub chunk_overlap_chars: usize,
    /// Character budget for a message group before a split is forced (default: 400)
    pub group_max_chars: usize,
    /// Cohesion window between consecutive messages of a group (default: 120)
    pub group_time_window_seconds: i64,
    /// Tightened cohesion window in busy chats (default: 30)
    pub busy_chat_time_window_seconds: i64,
    /// Distinct authors in a rolling five-minute window marking a chat busy (default: 5)
    pub busy_chat_author_threshold: usize,
    /// Window for tagging a group as a likely answer to a preceding question (default: 30)
    pub answer_window_seconds: i64,
    /// Lookback for the short-reply answer heuristic (default: 60)
    pub question_lookback_seconds: i64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    /// Chunks fetched per query (default: 20)
    pub k: usize,
    /// Minimum cosine similarity kept after search (default: 0.0)
    pub min_similarity: f64,
}

impl RetrievalConfig {
    /// Hard cap on `k`; results beyond it are discarded by the store.
    pub const MAX_K: usize = 50;
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueryConfig {
    /// Maximum query length in characters (default: 500)
    pub max_length: usize,
    /// Per-tenant request budget per minute (default: 100)
    pub rate_limit_per_minute_per_tenant: u32,
    /// Hard wall-clock deadline for query handlers, in seconds
    pub deadline_seconds: u64,
    /// Character cap applied to composed answers
    pub answer_max_chars: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IndexingConfig {
    /// Process-wide cap on concurrently running indexing jobs
    pub max_concurrent_jobs: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            user: "postgres".to_string(),
            password: "password".to_string().into(),
            host: "localhost".to_string(),
            port: 5432,
            database: "postgres".to_string(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.openai.com/v1".to_string(),
            api_key: SecretString::from(String::new()),
            embedding_model: "text-embedding-3-small".to_string(),
            embedding_dimension: 1536,
            completion_model: "gpt-4o-mini".to_string(),
            request_timeout_seconds: 30,
            answer_max_output_tokens: 512,
        }
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bridge_url: String::new(),
            request_timeout_seconds: 30,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            batch_size: 64,
            concurrency: 4,
            max_retries: 5,
            max_pending_chunks: 1024,
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size_chars: 500,
            chunk_overlap_chars: 100,
            group_max_chars: 400,
            group_time_window_seconds: 120,
            busy_chat_time_window_seconds: 30,
            busy_chat_author_threshold: 5,
            answer_window_seconds: 30,
            question_lookback_seconds: 60,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: 20,
            min_similarity: 0.0,
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            max_length: 500,
            rate_limit_per_minute_per_tenant: 100,
            deadline_seconds: 30,
            answer_max_chars: 4000,
        }
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 4,
        }
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Use serde to serialize to pretty JSON
        // Secrets are automatically skipped due to #[serde(skip_serializing)]
        match serde_json::to_string_pretty(&self) {
            Ok(json) => write!(f, "{}", json),
            Err(_) => write!(f, "Error serializing config"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.ai.embedding_dimension, 1536);
        assert_eq!(config.embedding.batch_size, 64);
        assert_eq!(config.embedding.concurrency, 4);
        assert_eq!(config.embedding.max_retries, 5);
        assert_eq!(config.chunking.chunk_size_chars, 500);
        assert_eq!(config.chunking.chunk_overlap_chars, 100);
        assert_eq!(config.chunking.group_time_window_seconds, 120);
        assert_eq!(config.chunking.busy_chat_time_window_seconds, 30);
        assert_eq!(config.chunking.busy_chat_author_threshold, 5);
        assert_eq!(config.retrieval.k, 20);
        assert_eq!(config.retrieval.min_similarity, 0.0);
        assert_eq!(config.query.max_length, 500);
        assert_eq!(config.query.rate_limit_per_minute_per_tenant, 100);
    }

    #[test]
    fn test_default_config_validates() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_zero_dimension_rejected() {
        let mut config = Config::default();
        config.ai.embedding_dimension = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_oversized_k_rejected() {
        let mut config = Config::default();
        config.retrieval.k = RetrievalConfig::MAX_K + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overlap_must_stay_below_chunk_size() {
        let mut config = Config::default();
        config.chunking.chunk_overlap_chars = config.chunking.chunk_size_chars;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_display_redacts_secrets() {
        let config = Config::default();
        let rendered = format!("{}", config);
        assert!(!rendered.contains("password"));
        assert!(!rendered.contains("api_key"));
    }
}
