//! External collaborator interfaces.
//!
//! The core consumes the Telegram fetch service, the embedding provider, the
//! answer LLM, and blob storage through the traits below. Implementations own
//! their wire formats; the core only sees typed results and a
//! transient/permanent error classification that drives retry policy.

pub mod openai;
pub mod telegram;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{chats::ChatType, messages::IncomingMessage};

/// Failure classification for provider calls. Retry policy is driven by this
/// classification, not by inspecting messages at call sites.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Worth retrying: timeout, rate limit, 5xx.
    #[error("transient provider error: {0}")]
    Transient(String),

    /// Not worth retrying: malformed input, auth failure, 4xx.
    #[error("permanent provider error: {0}")]
    Permanent(String),

    /// The request exceeded provider limits; retryable after re-batching.
    #[error("provider payload too large: {0}")]
    PayloadTooLarge(String),
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transient(_))
    }

    /// Maps an HTTP status to the retry classification.
    pub fn from_status(status: reqwest::StatusCode, body: String) -> Self {
        if status == reqwest::StatusCode::PAYLOAD_TOO_LARGE {
            ProviderError::PayloadTooLarge(body)
        } else if status == reqwest::StatusCode::TOO_MANY_REQUESTS
            || status == reqwest::StatusCode::REQUEST_TIMEOUT
            || status.is_server_error()
        {
            ProviderError::Transient(format!("{}: {}", status, body))
        } else {
            ProviderError::Permanent(format!("{}: {}", status, body))
        }
    }

    /// Maps a reqwest transport error; timeouts and connection failures are
    /// transient, everything else permanent.
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            ProviderError::Transient(err.to_string())
        } else {
            ProviderError::Permanent(err.to_string())
        }
    }
}

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// A chat as reported by the Telegram fetch service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteChat {
    pub chat_id: i64,
    pub title: String,
    pub chat_type: ChatType,
}

/// One page of fetched messages; `next_cursor` is `None` on the last page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagePage {
    pub messages: Vec<IncomingMessage>,
    pub next_cursor: Option<i64>,
}

/// Telegram fetch interface (consumed). The MTProto client and session
/// handling live behind this seam.
#[async_trait]
pub trait TelegramClient: Send + Sync {
    async fn list_chats(&self, tenant_id: &str) -> ProviderResult<Vec<RemoteChat>>;

    async fn fetch_messages(
        &self,
        tenant_id: &str,
        chat_id: i64,
        cursor: Option<i64>,
    ) -> ProviderResult<MessagePage>;
}

/// Embedding provider interface (consumed). Vectors are fixed-dimension;
/// the dimension is a configuration constant enforced by callers.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, texts: &[String]) -> ProviderResult<Vec<Vec<f32>>>;
}

/// Answer LLM interface (consumed).
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(
        &self,
        system: &str,
        user: &str,
        max_output_tokens: u32,
    ) -> ProviderResult<String>;
}

/// Blob storage interface (consumed). Reserved for the image path; the text
/// pipeline does not use it.
#[async_trait]
pub trait BlobStorage: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> ProviderResult<String>;

    async fn get(&self, key: &str) -> ProviderResult<Vec<u8>>;
}
