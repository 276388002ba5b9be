use chrono::{DateTime, Utc};
use pgvector::Vector;
use sqlx::Acquire;
use std::collections::HashSet;
use uuid::Uuid;

use crate::{
    DbConn,
    config::RetrievalConfig,
    error::{Error, Result},
    models::chunks::{ChunkMetadata, EmbeddedChunk},
};

/// Optional restrictions applied inside the similarity search.
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub chat_ids: Option<Vec<i64>>,
    pub sent_after: Option<DateTime<Utc>>,
    pub sent_before: Option<DateTime<Utc>>,
}

/// Row structure for similarity search results.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SearchRow {
    pub chunk_id: Uuid,
    pub message_id: Uuid,
    pub chunk_index: i32,
    pub text: String,
    pub metadata: sqlx::types::Json<ChunkMetadata>,
    pub similarity: f64,
}

/// Atomically persists one message's chunks with their embeddings.
///
/// The transaction boundary is one parent message: either all of its chunks
/// land or none do. Re-inserting an existing `(message_id, chunk_index)` is
/// a no-op, which keeps indexing idempotent.
pub async fn insert_chunks_with_embeddings(
    conn: &mut DbConn,
    message_id: Uuid,
    chunks: &[EmbeddedChunk],
) -> Result<u64> {
    let mut tx = conn
        .begin()
        .await
        .map_err(|e| Error::Internal(format!("Failed to begin transaction: {}", e)))?;

    let mut inserted = 0u64;
    for chunk in chunks {
        let result = sqlx::query(
            r#"
            INSERT INTO chunks (id, message_id, chunk_index, text, metadata, embedding)
            VALUES (gen_random_uuid(), $1, $2, $3, $4, $5)
            ON CONFLICT (message_id, chunk_index) DO NOTHING
            "#,
        )
        .bind(message_id)
        .bind(chunk.draft.chunk_index)
        .bind(&chunk.draft.text)
        .bind(sqlx::types::Json(&chunk.draft.metadata))
        .bind(&chunk.embedding)
        .execute(&mut *tx)
        .await
        .map_err(Error::Sqlx)?;
        inserted += result.rows_affected();
    }

    tx.commit()
        .await
        .map_err(|e| Error::Internal(format!("Failed to commit transaction: {}", e)))?;

    Ok(inserted)
}

/// Returns the `(chat_id, message_seq, chunk_index)` keys that already carry
/// an embedding, so the pipeline can skip the provider call for them.
pub async fn existing_chunk_keys(
    conn: &mut DbConn,
    chat_id: i64,
    message_seqs: &[i64],
) -> Result<HashSet<(i64, i64, i32)>> {
    let rows: Vec<(i64, i64, i32)> = sqlx::query_as(
        r#"
        SELECT m.chat_id, m.message_seq, c.chunk_index
        FROM chunks c
        INNER JOIN messages m ON m.id = c.message_id
        WHERE m.chat_id = $1 AND m.message_seq = ANY($2)
        "#,
    )
    .bind(chat_id)
    .bind(message_seqs)
    .fetch_all(conn)
    .await
    .map_err(Error::Sqlx)?;

    Ok(rows.into_iter().collect())
}

/// Cosine similarity search over a tenant's corpus.
///
/// Joins through `message_tenants`: no code path may return a chunk whose
/// message lacks a membership row for the calling tenant. `k` is capped at
/// the store-level maximum; ties break on newer primary timestamp.
pub async fn similarity_search(
    conn: &mut DbConn,
    tenant_id: &str,
    query_vector: &Vector,
    k: usize,
    filters: &SearchFilters,
) -> Result<Vec<SearchRow>> {
    let limit = k.min(RetrievalConfig::MAX_K) as i64;

    // Note: cosine similarity = 1 - cosine distance; pgvector <=> is cosine distance
    let rows = sqlx::query_as::<_, SearchRow>(
        r#"
        SELECT
            c.id AS chunk_id,
            c.message_id,
            c.chunk_index,
            c.text,
            c.metadata,
            (1 - (c.embedding <=> $2))::float8 AS similarity
        FROM chunks c
        INNER JOIN messages m ON m.id = c.message_id
        INNER JOIN message_tenants mt ON mt.message_id = m.id AND mt.tenant_id = $1
        WHERE ($3::bigint[] IS NULL OR m.chat_id = ANY($3))
          AND ($4::timestamptz IS NULL OR m.sent_at >= $4)
          AND ($5::timestamptz IS NULL OR m.sent_at <= $5)
        ORDER BY c.embedding <=> $2 ASC, m.sent_at DESC
        LIMIT $6
        "#,
    )
    .bind(tenant_id)
    .bind(query_vector)
    .bind(&filters.chat_ids)
    .bind(filters.sent_after)
    .bind(filters.sent_before)
    .bind(limit)
    .fetch_all(conn)
    .await
    .map_err(Error::Sqlx)?;

    Ok(rows)
}
