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
pub enum ChatType {
    Private,
    Group,
    Channel,
    Supergroup,
}

/// A tenant's association with one Telegram conversation.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Chat {
    pub id: Uuid,
    pub tenant_id: String,
    /// Telegram chat identifier (negative for groups and channels)
    pub chat_id: i64,
    pub title: String,
    pub chat_type: ChatType,
    pub last_indexed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_chat_type_serialization() {
        let ct = ChatType::Supergroup;
        assert_eq!(ct.to_string(), "supergroup");
        assert_eq!(
            ChatType::from_str("supergroup").unwrap(),
            ChatType::Supergroup
        );
    }

    #[test]
    fn test_chat_type_json_round_trip() {
        let json = serde_json::to_string(&ChatType::Private).unwrap();
        assert_eq!(json, "\"private\"");
        let back: ChatType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ChatType::Private);
    }
}
