use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One post fetched from a chat, before it has a storage identity.
///
/// `(chat_id, message_seq)` is the global identity of a message; ingestion is
/// at-least-once and deduplicated on insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub chat_id: i64,
    pub message_seq: i64,
    pub author_id: i64,
    pub author_name: String,
    pub author_handle: Option<String>,
    pub sent_at: DateTime<Utc>,
    pub text: String,
    pub reply_to_seq: Option<i64>,
}
