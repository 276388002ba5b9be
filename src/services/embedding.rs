//! Concurrent, batched embedding pipeline.
//!
//! Chunks are batched, embedded through the provider with bounded
//! concurrency, and streamed back to the caller as batches complete — in no
//! particular order. Backpressure comes from the bounded outcome channel:
//! a slow consumer stalls workers, which stalls batch submission.

use pgvector::Vector;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::{AiConfig, EmbeddingConfig};
use crate::models::chunks::{ChunkDraft, EmbeddedChunk};
use crate::providers::{EmbeddingProvider, ProviderError, ProviderResult};

/// Retry policy as data; the classification on `ProviderError` decides
/// whether a failure is worth another attempt.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff with jitter for the given 1-based attempt.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let base = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(exp))
            .min(self.max_delay);
        let jitter_ceiling = (base.as_millis() / 2).max(1) as u64;
        let jitter = rand::rng().random_range(0..=jitter_ceiling);
        base + Duration::from_millis(jitter)
    }
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub batch_size: usize,
    pub concurrency: usize,
    pub max_pending_chunks: usize,
    pub expected_dimension: usize,
    pub retry: RetryPolicy,
}

impl PipelineSettings {
    pub fn from_config(embedding: &EmbeddingConfig, ai: &AiConfig) -> Self {
        Self {
            batch_size: embedding.batch_size.max(1),
            concurrency: embedding.concurrency.max(1),
            max_pending_chunks: embedding.max_pending_chunks.max(embedding.batch_size).max(1),
            expected_dimension: ai.embedding_dimension,
            retry: RetryPolicy {
                max_attempts: embedding.max_retries.max(1),
                ..RetryPolicy::default()
            },
        }
    }
}

/// Result of one provider batch. Failures carry the chunk count so the
/// coordinator can account for them without halting other batches.
#[derive(Debug)]
pub enum BatchOutcome {
    Embedded(Vec<EmbeddedChunk>),
    Failed { chunk_count: usize, error: String },
}

/// Starts the pipeline over `drafts` and returns the outcome stream.
///
/// Cancellation is cooperative: once the token fires, no new batches start,
/// but in-flight provider calls finish and their outcomes are still
/// delivered.
pub fn spawn_pipeline(
    embedder: Arc<dyn EmbeddingProvider>,
    settings: PipelineSettings,
    drafts: Vec<ChunkDraft>,
    cancel: CancellationToken,
) -> mpsc::Receiver<BatchOutcome> {
    let channel_capacity = (settings.max_pending_chunks / settings.batch_size).max(1);
    let (tx, rx) = mpsc::channel(channel_capacity);
    let semaphore = Arc::new(Semaphore::new(settings.concurrency));

    tokio::spawn(async move {
        let mut workers = JoinSet::new();
        let mut batches: Vec<Vec<ChunkDraft>> = Vec::new();
        let mut drafts = drafts;
        while !drafts.is_empty() {
            let rest = drafts.split_off(drafts.len().min(settings.batch_size));
            batches.push(std::mem::replace(&mut drafts, rest));
        }

        for batch in batches {
            if cancel.is_cancelled() {
                tracing::info!("embedding pipeline canceled; not starting further batches");
                break;
            }
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };

            let embedder = Arc::clone(&embedder);
            let tx = tx.clone();
            let retry = settings.retry.clone();
            let expected_dimension = settings.expected_dimension;
            workers.spawn(async move {
                let outcomes =
                    embed_splitting(embedder.as_ref(), &retry, expected_dimension, batch).await;
                for outcome in outcomes {
                    if tx.send(outcome).await.is_err() {
                        break;
                    }
                }
                drop(permit);
            });
        }

        while workers.join_next().await.is_some() {}
    });

    rx
}

/// Embeds a batch, splitting it in half and retrying when the provider
/// reports the payload as too large. Each terminal sub-batch yields one
/// outcome.
async fn embed_splitting(
    embedder: &dyn EmbeddingProvider,
    retry: &RetryPolicy,
    expected_dimension: usize,
    batch: Vec<ChunkDraft>,
) -> Vec<BatchOutcome> {
    let mut outcomes = Vec::new();
    let mut stack = vec![batch];

    while let Some(batch) = stack.pop() {
        match embed_with_retry(embedder, retry, &batch).await {
            Ok(vectors) => outcomes.push(bind_vectors(batch, vectors, expected_dimension)),
            Err(ProviderError::PayloadTooLarge(reason)) if batch.len() > 1 => {
                tracing::debug!(
                    chunk_count = batch.len(),
                    reason,
                    "payload too large; re-batching in halves"
                );
                let mut left = batch;
                let right = left.split_off(left.len() / 2);
                stack.push(right);
                stack.push(left);
            }
            Err(error) => {
                tracing::warn!(chunk_count = batch.len(), error = %error, "embedding batch failed");
                outcomes.push(BatchOutcome::Failed {
                    chunk_count: batch.len(),
                    error: error.to_string(),
                });
            }
        }
    }

    outcomes
}

async fn embed_with_retry(
    embedder: &dyn EmbeddingProvider,
    retry: &RetryPolicy,
    batch: &[ChunkDraft],
) -> ProviderResult<Vec<Vec<f32>>> {
    let texts: Vec<String> = batch.iter().map(|chunk| chunk.text.clone()).collect();
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match embedder.embed(&texts).await {
            Ok(vectors) => return Ok(vectors),
            Err(error) if error.is_transient() && attempt < retry.max_attempts => {
                let delay = retry.backoff_delay(attempt);
                tracing::warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "transient embedding failure; backing off"
                );
                tokio::time::sleep(delay).await;
            }
            Err(error) => return Err(error),
        }
    }
}

/// Pairs returned vectors with their drafts, enforcing the dimension
/// invariant. A mismatch is an invariant violation, not a retryable fault.
fn bind_vectors(
    batch: Vec<ChunkDraft>,
    vectors: Vec<Vec<f32>>,
    expected_dimension: usize,
) -> BatchOutcome {
    if vectors.len() != batch.len() {
        tracing::error!(
            expected = batch.len(),
            got = vectors.len(),
            "provider returned wrong embedding count"
        );
        return BatchOutcome::Failed {
            chunk_count: batch.len(),
            error: format!(
                "provider returned {} embeddings for {} chunks",
                vectors.len(),
                batch.len()
            ),
        };
    }

    if let Some(bad) = vectors.iter().find(|v| v.len() != expected_dimension) {
        tracing::error!(
            expected_dimension,
            got = bad.len(),
            "embedding dimension mismatch"
        );
        return BatchOutcome::Failed {
            chunk_count: batch.len(),
            error: format!(
                "embedding dimension mismatch: expected {}, got {}",
                expected_dimension,
                bad.len()
            ),
        };
    }

    let embedded = batch
        .into_iter()
        .zip(vectors)
        .map(|(draft, vector)| EmbeddedChunk {
            draft,
            embedding: Vector::from(vector),
        })
        .collect();
    BatchOutcome::Embedded(embedded)
}
