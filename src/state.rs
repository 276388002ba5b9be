use std::sync::Arc;
use tokio::sync::mpsc;

use crate::DbPool;
use crate::config::Config;
use crate::providers::{CompletionProvider, EmbeddingProvider, TelegramClient};
use crate::services::indexing::{JobRegistry, QueuedJob};
use crate::services::rate_limit::RateLimiter;

/// Application state shared across all HTTP handlers.
///
/// External collaborators are held behind their interface traits; process
/// lifecycles (connection pool, provider clients) are initialized once at
/// startup and shared from here instead of through globals.
#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub config: Arc<Config>,
    pub telegram: Arc<dyn TelegramClient>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub completer: Arc<dyn CompletionProvider>,
    pub rate_limiter: Arc<RateLimiter>,
    pub jobs: JobRegistry,
    pub job_tx: mpsc::Sender<QueuedJob>,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: DbPool,
        config: Arc<Config>,
        telegram: Arc<dyn TelegramClient>,
        embedder: Arc<dyn EmbeddingProvider>,
        completer: Arc<dyn CompletionProvider>,
        rate_limiter: Arc<RateLimiter>,
        jobs: JobRegistry,
        job_tx: mpsc::Sender<QueuedJob>,
    ) -> Self {
        Self {
            pool,
            config,
            telegram,
            embedder,
            completer,
            rate_limiter,
            jobs,
            job_tx,
        }
    }
}
