//! Retrieval engine: embeds a sanitized query, runs the tenant-scoped
//! similarity search, and hydrates results into citable form.

use pgvector::Vector;

use crate::{
    DbConn,
    config::RetrievalConfig,
    error::{Error, Result},
    models::chunks::ChunkMetadata,
    providers::EmbeddingProvider,
    queries::chunks::{self, SearchFilters},
};
use uuid::Uuid;

/// A hydrated similarity-search hit, ordered by similarity descending with
/// ties broken by newer primary timestamp.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub chunk_id: Uuid,
    pub text: String,
    pub similarity: f64,
    pub metadata: ChunkMetadata,
    pub url: String,
}

/// Synthesizes the public deep link for a message.
///
/// Channel and supergroup identifiers carry a `-100` prefix that the t.me
/// URL space omits; plain negative group ids drop their sign.
pub fn deep_link(chat_id: i64, message_seq: i64) -> String {
    let rendered = chat_id.to_string();
    let bare = match rendered.strip_prefix("-100") {
        Some(stripped) if !stripped.is_empty() => stripped.to_string(),
        _ => chat_id.unsigned_abs().to_string(),
    };
    format!("https://t.me/c/{}/{}", bare, message_seq)
}

/// Runs the full retrieval path for a sanitized query.
pub async fn search(
    conn: &mut DbConn,
    embedder: &dyn EmbeddingProvider,
    retrieval: &RetrievalConfig,
    expected_dimension: usize,
    tenant_id: &str,
    query: &str,
    filters: &SearchFilters,
) -> Result<Vec<RetrievedChunk>> {
    let texts = [query.to_string()];
    let mut vectors = embedder
        .embed(&texts)
        .await
        .map_err(|e| Error::UpstreamUnavailable(format!("embedding provider: {}", e)))?;

    let vector = vectors
        .pop()
        .ok_or_else(|| Error::UpstreamUnavailable("embedding provider returned no vector".into()))?;

    if vector.len() != expected_dimension {
        return Err(Error::Internal(format!(
            "query embedding dimension mismatch: expected {}, got {}",
            expected_dimension,
            vector.len()
        )));
    }

    let rows = chunks::similarity_search(
        conn,
        tenant_id,
        &Vector::from(vector),
        retrieval.k,
        filters,
    )
    .await?;

    let results = rows
        .into_iter()
        .filter(|row| row.similarity >= retrieval.min_similarity)
        .map(|row| {
            let metadata = row.metadata.0;
            let url = deep_link(metadata.chat_id, metadata.message_seq);
            RetrievedChunk {
                chunk_id: row.chunk_id,
                text: row.text,
                similarity: row.similarity,
                metadata,
                url,
            }
        })
        .collect();

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deep_link_strips_supergroup_prefix() {
        assert_eq!(
            deep_link(-1001234567890, 42),
            "https://t.me/c/1234567890/42"
        );
    }

    #[test]
    fn test_deep_link_positive_chat_id() {
        assert_eq!(deep_link(777000, 5), "https://t.me/c/777000/5");
    }

    #[test]
    fn test_deep_link_legacy_group_drops_sign() {
        assert_eq!(deep_link(-12345, 7), "https://t.me/c/12345/7");
    }

    #[test]
    fn test_deep_link_bare_minus_100() {
        // Pathological id equal to the prefix itself must not yield an empty path
        assert_eq!(deep_link(-100, 1), "https://t.me/c/100/1");
    }
}
