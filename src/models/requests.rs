use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::timelines::TimelineItem;

/// POST /api/v1/index
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitIndexingRequest {
    pub chat_ids: Vec<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitIndexingResponse {
    pub job_id: Uuid,
    /// False when an already-active job was returned instead of a new one
    pub created: bool,
}

/// POST /api/v1/query/answer and /api/v1/query/timeline
#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    pub text: String,
    /// Restrict retrieval to these chats (optional)
    pub chat_ids: Option<Vec<i64>>,
    /// Persist the timeline under this title (timeline queries only)
    pub title: Option<String>,
}

/// A cited retrieval result returned alongside an answer.
#[derive(Debug, Clone, Serialize)]
pub struct SourceRef {
    pub url: String,
    pub chat_title: String,
    pub author_name: String,
    #[serde(serialize_with = "crate::models::timelines::serialize_rfc3339")]
    pub ts: chrono::DateTime<chrono::Utc>,
    pub text: String,
    pub similarity: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnswerResponse {
    pub answer: String,
    pub sources: Vec<SourceRef>,
    /// Present when the answer is degraded (e.g. the language model failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimelineResponse {
    pub items: Vec<TimelineItem>,
    /// Set when the timeline was persisted under a title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeline_id: Option<Uuid>,
}
