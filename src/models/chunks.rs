use chrono::{DateTime, Utc};
use pgvector::Vector;
use serde::{Deserialize, Serialize};

/// Structured metadata carried by every chunk.
///
/// Denormalized so a citation can be rendered from the chunk alone, without
/// joining back to messages or chats. Serialized into the JSONB `metadata`
/// column for forward compatibility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Timestamp of the primary (first) message of the group
    pub ts: DateTime<Utc>,
    pub chat_title: String,
    pub chat_id: i64,
    /// Sequence number of the primary message, for deep-link synthesis
    pub message_seq: i64,
    pub author_name: String,
    pub author_handle: Option<String>,
    /// Full original text of the grouped message(s)
    pub full_text: String,
    pub reply_to_seq: Option<i64>,
    /// Text of the replied-to message, when it was within lookback range
    pub reply_to_text: Option<String>,
    /// Sequence of a preceding question this group likely answers
    pub likely_answer_to: Option<i64>,
    pub is_question: bool,
    pub is_answer: bool,
    pub chunk_index: i32,
    pub total_chunks: i32,
}

/// A chunker-produced unit that has not been embedded yet.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkDraft {
    pub chat_id: i64,
    /// Primary message of the group this chunk was cut from
    pub message_seq: i64,
    pub chunk_index: i32,
    pub text: String,
    pub metadata: ChunkMetadata,
}

impl ChunkDraft {
    /// Dedup identity: a chunk with this key already embedded is skipped.
    pub fn key(&self) -> (i64, i64, i32) {
        (self.chat_id, self.message_seq, self.chunk_index)
    }
}

/// A draft paired with its embedding vector, ready to persist.
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub draft: ChunkDraft,
    pub embedding: Vector,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_metadata() -> ChunkMetadata {
        ChunkMetadata {
            ts: Utc.with_ymd_and_hms(2023, 1, 7, 14, 17, 29).unwrap(),
            chat_title: "Site ops".to_string(),
            chat_id: -1001234567890,
            message_seq: 42,
            author_name: "Colin".to_string(),
            author_handle: Some("colin_ops".to_string()),
            full_text: "Ordered 190 kW generator from Billy Smith.".to_string(),
            reply_to_seq: None,
            reply_to_text: None,
            likely_answer_to: None,
            is_question: false,
            is_answer: false,
            chunk_index: 0,
            total_chunks: 1,
        }
    }

    #[test]
    fn test_metadata_json_round_trip() {
        let metadata = sample_metadata();
        let json = serde_json::to_string(&metadata).unwrap();
        let back: ChunkMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back, metadata);
    }

    #[test]
    fn test_draft_key_identity() {
        let draft = ChunkDraft {
            chat_id: -1001234567890,
            message_seq: 42,
            chunk_index: 1,
            text: "Ordered 190 kW generator".to_string(),
            metadata: sample_metadata(),
        };
        assert_eq!(draft.key(), (-1001234567890, 42, 1));
    }
}
