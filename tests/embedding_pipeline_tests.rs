//! Embedding pipeline behavior against a scripted provider: batching,
//! retries, re-batching, failure isolation, and cooperative cancellation.

mod common;

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use chatlore::models::chunks::{ChunkDraft, ChunkMetadata};
use chatlore::services::embedding::{
    BatchOutcome, PipelineSettings, RetryPolicy, spawn_pipeline,
};
use chrono::{TimeZone, Utc};
use common::ScriptedEmbedder;

const DIMENSION: usize = 16;

fn draft(i: usize) -> ChunkDraft {
    let ts = Utc.with_ymd_and_hms(2023, 1, 7, 14, 0, 0).unwrap();
    ChunkDraft {
        chat_id: -1001234567890,
        message_seq: i as i64,
        chunk_index: 0,
        text: format!("chunk text {}", i),
        metadata: ChunkMetadata {
            ts,
            chat_title: "Site ops".to_string(),
            chat_id: -1001234567890,
            message_seq: i as i64,
            author_name: "Colin".to_string(),
            author_handle: None,
            full_text: format!("chunk text {}", i),
            reply_to_seq: None,
            reply_to_text: None,
            likely_answer_to: None,
            is_question: false,
            is_answer: false,
            chunk_index: 0,
            total_chunks: 1,
        },
    }
}

fn drafts(n: usize) -> Vec<ChunkDraft> {
    (0..n).map(draft).collect()
}

fn settings(batch_size: usize, max_attempts: u32) -> PipelineSettings {
    PipelineSettings {
        batch_size,
        concurrency: 4,
        max_pending_chunks: 1024,
        expected_dimension: DIMENSION,
        retry: RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        },
    }
}

async fn collect(mut rx: tokio::sync::mpsc::Receiver<BatchOutcome>) -> Vec<BatchOutcome> {
    let mut outcomes = Vec::new();
    while let Some(outcome) = rx.recv().await {
        outcomes.push(outcome);
    }
    outcomes
}

fn embedded_count(outcomes: &[BatchOutcome]) -> usize {
    outcomes
        .iter()
        .map(|o| match o {
            BatchOutcome::Embedded(chunks) => chunks.len(),
            BatchOutcome::Failed { .. } => 0,
        })
        .sum()
}

fn failed_count(outcomes: &[BatchOutcome]) -> usize {
    outcomes
        .iter()
        .map(|o| match o {
            BatchOutcome::Embedded(_) => 0,
            BatchOutcome::Failed { chunk_count, .. } => *chunk_count,
        })
        .sum()
}

#[tokio::test]
async fn embeds_all_chunks_in_batches() {
    let embedder = Arc::new(ScriptedEmbedder::ok(DIMENSION));
    let rx = spawn_pipeline(
        embedder.clone(),
        settings(64, 5),
        drafts(150),
        CancellationToken::new(),
    );

    let outcomes = collect(rx).await;
    assert_eq!(embedded_count(&outcomes), 150);
    assert_eq!(failed_count(&outcomes), 0);

    let mut sizes = embedder.recorded_batch_sizes();
    sizes.sort_unstable();
    assert_eq!(sizes, vec![22, 64, 64]);
}

#[tokio::test]
async fn embedded_vectors_carry_configured_dimension() {
    let embedder = Arc::new(ScriptedEmbedder::ok(DIMENSION));
    let rx = spawn_pipeline(
        embedder,
        settings(8, 5),
        drafts(10),
        CancellationToken::new(),
    );

    for outcome in collect(rx).await {
        if let BatchOutcome::Embedded(chunks) = outcome {
            for chunk in chunks {
                assert_eq!(chunk.embedding.as_slice().len(), DIMENSION);
            }
        }
    }
}

#[tokio::test]
async fn transient_failures_are_retried() {
    let embedder = Arc::new(ScriptedEmbedder::transient_then_ok(DIMENSION, 2));
    let rx = spawn_pipeline(
        embedder.clone(),
        settings(64, 5),
        drafts(10),
        CancellationToken::new(),
    );

    let outcomes = collect(rx).await;
    assert_eq!(embedded_count(&outcomes), 10);
    assert!(embedder.call_count() >= 3, "expected retries before success");
}

#[tokio::test]
async fn exhausted_retries_fail_the_batch() {
    let embedder = Arc::new(ScriptedEmbedder::transient_then_ok(DIMENSION, 100));
    let rx = spawn_pipeline(
        embedder.clone(),
        settings(64, 2),
        drafts(10),
        CancellationToken::new(),
    );

    let outcomes = collect(rx).await;
    assert_eq!(embedded_count(&outcomes), 0);
    assert_eq!(failed_count(&outcomes), 10);
    assert_eq!(embedder.call_count(), 2);
}

#[tokio::test]
async fn permanent_failure_is_not_retried() {
    let embedder = Arc::new(ScriptedEmbedder::permanent_failure(DIMENSION));
    let rx = spawn_pipeline(
        embedder.clone(),
        settings(64, 5),
        drafts(10),
        CancellationToken::new(),
    );

    let outcomes = collect(rx).await;
    assert_eq!(failed_count(&outcomes), 10);
    assert_eq!(embedder.call_count(), 1);
}

#[tokio::test]
async fn permanent_failure_does_not_halt_other_batches() {
    // One poisoned chunk fails its batch; every other batch still embeds.
    let embedder = Arc::new(ScriptedEmbedder::poisoned_by(DIMENSION, "chunk text 3"));
    let rx = spawn_pipeline(
        embedder,
        settings(10, 5),
        drafts(20),
        CancellationToken::new(),
    );

    let outcomes = collect(rx).await;
    assert_eq!(embedded_count(&outcomes), 10);
    assert_eq!(failed_count(&outcomes), 10);
}

#[tokio::test]
async fn payload_too_large_rebatches_in_halves() {
    let embedder = Arc::new(ScriptedEmbedder::payload_limited(DIMENSION, 10));
    let rx = spawn_pipeline(
        embedder.clone(),
        settings(16, 5),
        drafts(16),
        CancellationToken::new(),
    );

    let outcomes = collect(rx).await;
    assert_eq!(embedded_count(&outcomes), 16);

    let sizes = embedder.recorded_batch_sizes();
    assert!(sizes.contains(&16), "original oversized batch was attempted");
    assert_eq!(sizes.iter().filter(|&&s| s == 8).count(), 2);
}

#[tokio::test]
async fn dimension_mismatch_fails_loud() {
    // Provider returns 8-dimensional vectors; the pipeline expects 16.
    let embedder = Arc::new(ScriptedEmbedder::ok(8));
    let rx = spawn_pipeline(
        embedder,
        settings(64, 5),
        drafts(5),
        CancellationToken::new(),
    );

    let outcomes = collect(rx).await;
    assert_eq!(embedded_count(&outcomes), 0);
    assert_eq!(failed_count(&outcomes), 5);
    match &outcomes[0] {
        BatchOutcome::Failed { error, .. } => {
            assert!(error.contains("dimension"), "unexpected error: {}", error);
        }
        BatchOutcome::Embedded(_) => panic!("expected a failed outcome"),
    }
}

#[tokio::test]
async fn cancellation_prevents_new_batches() {
    let embedder = Arc::new(ScriptedEmbedder::ok(DIMENSION));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let rx = spawn_pipeline(embedder.clone(), settings(8, 5), drafts(100), cancel);

    let outcomes = collect(rx).await;
    assert!(outcomes.is_empty());
    assert_eq!(embedder.call_count(), 0);
}

#[tokio::test]
async fn empty_input_completes_immediately() {
    let embedder = Arc::new(ScriptedEmbedder::ok(DIMENSION));
    let rx = spawn_pipeline(
        embedder,
        settings(8, 5),
        Vec::new(),
        CancellationToken::new(),
    );

    let outcomes = collect(rx).await;
    assert!(outcomes.is_empty());
}
