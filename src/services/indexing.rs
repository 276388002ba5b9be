//! Indexing coordinator: drives one job through
//! `pending → fetching → chunking → embedding → completed | failed`.
//!
//! The job record is written only by the coordinator that owns it; readers
//! poll lock-free and counters only ever grow. Cancellation is cooperative,
//! checked at stage boundaries and before each outbound call.

use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    DbPool,
    config::Config,
    error::{Error, Result},
    models::{chunks::EmbeddedChunk, jobs::JobStatus, messages::IncomingMessage},
    providers::{EmbeddingProvider, MessagePage, ProviderError, TelegramClient},
    queries::{
        chats, chunks,
        jobs::{self, ProgressCounters},
        messages,
    },
    services::{
        chunker,
        embedding::{self, BatchOutcome, PipelineSettings, RetryPolicy},
    },
};

/// Live-job registry: the cancellation token of each running job.
#[derive(Clone, Default)]
pub struct JobRegistry {
    inner: Arc<DashMap<Uuid, CancellationToken>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, job_id: Uuid, token: CancellationToken) {
        self.inner.insert(job_id, token);
    }

    pub fn remove(&self, job_id: Uuid) {
        self.inner.remove(&job_id);
    }

    /// Fires the job's cancellation token. Returns false when the job is not
    /// currently running in this process.
    pub fn cancel(&self, job_id: Uuid) -> bool {
        match self.inner.get(&job_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}

/// A submission handed to the worker pool.
#[derive(Debug, Clone)]
pub struct QueuedJob {
    pub job_id: Uuid,
    pub tenant_id: String,
    pub chat_ids: Vec<i64>,
}

/// Everything a running job needs; cheap to clone into worker tasks.
#[derive(Clone)]
pub struct IndexerContext {
    pub pool: DbPool,
    pub config: Arc<Config>,
    pub telegram: Arc<dyn TelegramClient>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub registry: JobRegistry,
}

enum JobOutcome {
    Completed,
    Canceled,
}

/// Creates a job for the tenant, or returns the already-active one.
///
/// Returns `(job_id, created)`. Only a freshly created job is enqueued; a
/// repeat submission while one is active is informational, not an error.
pub async fn submit(
    pool: &DbPool,
    job_tx: &tokio::sync::mpsc::Sender<QueuedJob>,
    tenant_id: &str,
    chat_ids: Vec<i64>,
) -> Result<(Uuid, bool)> {
    if chat_ids.is_empty() {
        return Err(Error::InvalidQuery(
            "At least one chat must be selected for indexing".to_string(),
        ));
    }

    let mut conn = pool
        .acquire()
        .await
        .map_err(|e| Error::Internal(format!("Failed to acquire database connection: {}", e)))?;

    let (job, created) = jobs::create_job(&mut conn, tenant_id, &chat_ids).await?;

    if created {
        let queued = QueuedJob {
            job_id: job.id,
            tenant_id: tenant_id.to_string(),
            chat_ids,
        };
        if job_tx.send(queued).await.is_err() {
            jobs::update_status(
                &mut conn,
                job.id,
                JobStatus::Failed,
                Some("worker pool unavailable"),
            )
            .await?;
            return Err(Error::Internal(
                "Indexing worker pool is not accepting jobs".to_string(),
            ));
        }
        tracing::info!(job_id = %job.id, tenant_id, chat_count = job.chat_ids.len(), "indexing job submitted");
    } else {
        tracing::info!(job_id = %job.id, tenant_id, "returning already-active indexing job");
    }

    Ok((job.id, created))
}

/// Requests cooperative cancellation of a tenant's job.
///
/// A running job finishes its in-flight calls and terminates as failed with
/// reason "canceled"; a still-queued job is marked directly.
pub async fn cancel(
    pool: &DbPool,
    registry: &JobRegistry,
    tenant_id: &str,
    job_id: Uuid,
) -> Result<()> {
    let mut conn = pool
        .acquire()
        .await
        .map_err(|e| Error::Internal(format!("Failed to acquire database connection: {}", e)))?;

    let job = jobs::get_job(&mut conn, tenant_id, job_id).await?;
    if job.status.is_terminal() {
        return Err(Error::Conflict(format!(
            "Job {} already finished as {}",
            job_id, job.status
        )));
    }

    if !registry.cancel(job_id) {
        // Not picked up yet; the worker will skip it once it sees the status.
        jobs::update_status(&mut conn, job_id, JobStatus::Failed, Some("canceled")).await?;
    }

    Ok(())
}

/// Runs one job to a terminal state. Never panics the worker: every failure
/// path lands in the job record.
pub async fn run_job(ctx: &IndexerContext, job: QueuedJob) {
    let cancel = CancellationToken::new();
    ctx.registry.register(job.job_id, cancel.clone());

    let result = drive_job(ctx, &job, &cancel).await;
    ctx.registry.remove(job.job_id);

    match result {
        Ok(JobOutcome::Completed) => {
            tracing::info!(job_id = %job.job_id, "indexing job completed");
        }
        Ok(JobOutcome::Canceled) => {
            tracing::info!(job_id = %job.job_id, "indexing job canceled");
            finish_failed(ctx, job.job_id, "canceled").await;
        }
        Err(error) => {
            tracing::error!(job_id = %job.job_id, error = %error, "indexing job failed");
            finish_failed(ctx, job.job_id, &error.to_string()).await;
        }
    }
}

/// Best-effort terminal write; a storage failure here can only be logged.
async fn finish_failed(ctx: &IndexerContext, job_id: Uuid, reason: &str) {
    let Ok(mut conn) = ctx.pool.acquire().await else {
        tracing::error!(job_id = %job_id, "could not record job failure: no connection");
        return;
    };
    if let Err(error) = jobs::update_status(&mut conn, job_id, JobStatus::Failed, Some(reason)).await
    {
        tracing::error!(job_id = %job_id, error = %error, "could not record job failure");
    }
}

async fn drive_job(
    ctx: &IndexerContext,
    job: &QueuedJob,
    cancel: &CancellationToken,
) -> Result<JobOutcome> {
    let mut conn = ctx
        .pool
        .acquire()
        .await
        .map_err(|e| Error::Internal(format!("Failed to acquire database connection: {}", e)))?;

    let record = jobs::get_job(&mut conn, &job.tenant_id, job.job_id).await?;
    if record.status != JobStatus::Pending {
        tracing::info!(job_id = %job.job_id, status = %record.status, "skipping job not in pending state");
        return Ok(JobOutcome::Completed);
    }

    jobs::update_status(&mut conn, job.job_id, JobStatus::Fetching, None).await?;
    let mut progress = ProgressCounters::default();

    // Refresh chat associations up front; titles are denormalized into chunk
    // metadata so citations render without joins.
    let remote_chats = ctx
        .telegram
        .list_chats(&job.tenant_id)
        .await
        .map_err(|e| Error::UpstreamUnavailable(format!("telegram chat list: {}", e)))?;

    let mut titles: HashMap<i64, String> = HashMap::new();
    for remote in &remote_chats {
        if job.chat_ids.contains(&remote.chat_id) {
            chats::upsert_chat(&mut conn, &job.tenant_id, remote).await?;
            titles.insert(remote.chat_id, remote.title.clone());
        }
    }

    // Fetch stage: paginate each chat in ascending sequence, persisting
    // messages and memberships as pages arrive.
    let mut per_chat: Vec<(i64, Vec<IncomingMessage>)> = Vec::new();
    let mut message_ids: HashMap<(i64, i64), Uuid> = HashMap::new();

    for &chat_id in &job.chat_ids {
        let mut collected: Vec<IncomingMessage> = Vec::new();
        let mut cursor: Option<i64> = None;

        loop {
            if cancel.is_cancelled() {
                return Ok(JobOutcome::Canceled);
            }

            let page = fetch_page_with_retry(
                ctx.telegram.as_ref(),
                &job.tenant_id,
                chat_id,
                cursor,
            )
            .await
            .map_err(|e| Error::UpstreamUnavailable(format!("telegram fetch: {}", e)))?;

            for message in page.messages {
                let message_id = messages::upsert_message(&mut conn, &message).await?;
                messages::add_membership(&mut conn, &job.tenant_id, message_id).await?;
                message_ids.insert((message.chat_id, message.message_seq), message_id);
                progress.messages_processed += 1;
                collected.push(message);
            }
            jobs::bump_counters(&mut conn, job.job_id, progress).await?;

            cursor = page.next_cursor;
            if cursor.is_none() {
                break;
            }
        }

        per_chat.push((chat_id, collected));
    }

    // Every chat is paginated: the expected message count is locked in.
    progress.messages_total = Some(progress.messages_processed);
    jobs::bump_counters(&mut conn, job.job_id, progress).await?;

    if cancel.is_cancelled() {
        return Ok(JobOutcome::Canceled);
    }
    jobs::update_status(&mut conn, job.job_id, JobStatus::Chunking, None).await?;

    // Chunk stage, in fetch order per chat.
    let mut drafts = Vec::new();
    for (chat_id, chat_messages) in &per_chat {
        if cancel.is_cancelled() {
            return Ok(JobOutcome::Canceled);
        }
        let title = match titles.get(chat_id) {
            Some(title) => title.clone(),
            None => chats::chat_title(&mut conn, &job.tenant_id, *chat_id)
                .await?
                .unwrap_or_else(|| format!("Chat {}", chat_id)),
        };
        let chat_drafts = chunker::chunk_messages(chat_messages, &title, &ctx.config.chunking);
        progress.chunks_produced += chat_drafts.len() as i64;
        drafts.extend(chat_drafts);
    }
    jobs::bump_counters(&mut conn, job.job_id, progress).await?;

    // Dedup against storage: a chunk key that already carries an embedding
    // skips the provider call entirely (membership was added per message).
    let mut existing: HashSet<(i64, i64, i32)> = HashSet::new();
    for (chat_id, chat_messages) in &per_chat {
        let seqs: Vec<i64> = chat_messages.iter().map(|m| m.message_seq).collect();
        if !seqs.is_empty() {
            existing.extend(chunks::existing_chunk_keys(&mut conn, *chat_id, &seqs).await?);
        }
    }
    let before = drafts.len();
    drafts.retain(|draft| !existing.contains(&draft.key()));
    if before != drafts.len() {
        tracing::debug!(
            job_id = %job.job_id,
            skipped = before - drafts.len(),
            "skipping chunks already embedded"
        );
    }

    if cancel.is_cancelled() {
        return Ok(JobOutcome::Canceled);
    }
    jobs::update_status(&mut conn, job.job_id, JobStatus::Embedding, None).await?;

    // Embed stage: batches persist as they complete, out of submission
    // order. Completion is declared only once every outstanding batch is
    // either persisted or failed.
    let settings = PipelineSettings::from_config(&ctx.config.embedding, &ctx.config.ai);
    let mut outcomes = embedding::spawn_pipeline(
        Arc::clone(&ctx.embedder),
        settings,
        drafts,
        cancel.clone(),
    );

    let mut last_embed_error: Option<String> = None;
    while let Some(outcome) = outcomes.recv().await {
        match outcome {
            BatchOutcome::Embedded(embedded) => {
                let mut by_message: HashMap<Uuid, Vec<EmbeddedChunk>> = HashMap::new();
                for chunk in embedded {
                    let key = (chunk.draft.chat_id, chunk.draft.message_seq);
                    match message_ids.get(&key) {
                        Some(&message_id) => {
                            by_message.entry(message_id).or_default().push(chunk);
                        }
                        None => {
                            // Chunk without an ingested parent: invariant breach.
                            tracing::error!(job_id = %job.job_id, ?key, "embedded chunk has no parent message");
                            progress.embeddings_failed += 1;
                        }
                    }
                }

                for (message_id, group) in by_message {
                    let count = group.len() as i64;
                    match chunks::insert_chunks_with_embeddings(&mut conn, message_id, &group).await
                    {
                        Ok(_) => progress.embeddings_completed += count,
                        Err(error) => {
                            tracing::warn!(job_id = %job.job_id, error = %error, "failed to persist embedded chunks");
                            progress.embeddings_failed += count;
                            last_embed_error = Some(error.to_string());
                        }
                    }
                }
            }
            BatchOutcome::Failed { chunk_count, error } => {
                progress.embeddings_failed += chunk_count as i64;
                last_embed_error = Some(error);
            }
        }
        jobs::bump_counters(&mut conn, job.job_id, progress).await?;
    }

    if cancel.is_cancelled() {
        return Ok(JobOutcome::Canceled);
    }

    // Failed embeddings leave the job completable; the counters record them.
    jobs::update_status(
        &mut conn,
        job.job_id,
        JobStatus::Completed,
        last_embed_error.as_deref(),
    )
    .await?;

    for &chat_id in &job.chat_ids {
        chats::touch_last_indexed(&mut conn, &job.tenant_id, chat_id).await?;
    }

    Ok(JobOutcome::Completed)
}

/// Pages from the Telegram interface with transient-failure retries.
async fn fetch_page_with_retry(
    telegram: &dyn TelegramClient,
    tenant_id: &str,
    chat_id: i64,
    cursor: Option<i64>,
) -> std::result::Result<MessagePage, ProviderError> {
    let retry = RetryPolicy::default();
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match telegram.fetch_messages(tenant_id, chat_id, cursor).await {
            Ok(page) => return Ok(page),
            Err(error) if error.is_transient() && attempt < retry.max_attempts => {
                let delay = retry.backoff_delay(attempt);
                tracing::warn!(
                    chat_id,
                    attempt,
                    error = %error,
                    "transient telegram fetch failure; backing off"
                );
                tokio::time::sleep(delay).await;
            }
            Err(error) => return Err(error),
        }
    }
}
