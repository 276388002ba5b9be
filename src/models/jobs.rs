use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use uuid::Uuid;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, sqlx::Type,
)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Fetching,
    Chunking,
    Embedding,
    Completed,
    Failed,
}

impl JobStatus {
    /// Terminal states accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Validates a transition against the job lifecycle:
    /// pending → fetching → chunking → embedding → completed, with any
    /// non-terminal state allowed to fail.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (JobStatus::Pending, JobStatus::Fetching) => true,
            (JobStatus::Fetching, JobStatus::Chunking) => true,
            (JobStatus::Chunking, JobStatus::Embedding) => true,
            (JobStatus::Embedding, JobStatus::Completed) => true,
            (_, JobStatus::Failed) => true,
            _ => false,
        }
    }
}

/// Tenant-owned progress record for one indexing pass.
///
/// Written only by the coordinator driving the job; readers poll lock-free.
/// Counters are monotonically non-decreasing.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct IndexingJob {
    pub id: Uuid,
    pub tenant_id: String,
    pub chat_ids: Vec<i64>,
    pub status: JobStatus,
    pub messages_total: Option<i64>,
    pub messages_processed: i64,
    pub chunks_produced: i64,
    pub embeddings_completed: i64,
    pub embeddings_failed: i64,
    pub last_error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_status_serialization() {
        assert_eq!(JobStatus::Embedding.to_string(), "embedding");
        assert_eq!(JobStatus::from_str("failed").unwrap(), JobStatus::Failed);
    }

    #[test]
    fn test_lifecycle_transitions() {
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Fetching));
        assert!(JobStatus::Fetching.can_transition_to(JobStatus::Chunking));
        assert!(JobStatus::Chunking.can_transition_to(JobStatus::Embedding));
        assert!(JobStatus::Embedding.can_transition_to(JobStatus::Completed));
    }

    #[test]
    fn test_every_live_state_can_fail() {
        for status in [
            JobStatus::Pending,
            JobStatus::Fetching,
            JobStatus::Chunking,
            JobStatus::Embedding,
        ] {
            assert!(status.can_transition_to(JobStatus::Failed));
        }
    }

    #[test]
    fn test_terminal_states_are_final() {
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Failed));
        assert!(!JobStatus::Failed.can_transition_to(JobStatus::Pending));
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn test_no_skipping_stages() {
        assert!(!JobStatus::Pending.can_transition_to(JobStatus::Embedding));
        assert!(!JobStatus::Fetching.can_transition_to(JobStatus::Completed));
    }
}
