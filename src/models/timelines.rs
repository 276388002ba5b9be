use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};
use uuid::Uuid;

/// Serializes a timestamp as RFC 3339 UTC with seconds precision,
/// e.g. `2023-01-07T14:17:29Z`. The timeline JSON shape is externally
/// stable, so the format must not drift with chrono defaults.
pub fn serialize_rfc3339<S>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Secs, true))
}

/// One entry of the externally visible timeline JSON: `{ts, text, url}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineItem {
    #[serde(serialize_with = "serialize_rfc3339")]
    pub ts: DateTime<Utc>,
    pub text: String,
    pub url: String,
}

/// The item shape persisted in storage; keeps the chunk reference that the
/// public projection omits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredTimelineItem {
    #[serde(serialize_with = "serialize_rfc3339")]
    pub ts: DateTime<Utc>,
    pub text: String,
    pub url: String,
    pub chunk_id: Uuid,
}

impl StoredTimelineItem {
    pub fn to_public(&self) -> TimelineItem {
        TimelineItem {
            ts: self.ts,
            text: self.text.clone(),
            url: self.url.clone(),
        }
    }
}

/// Saved result of an answer-with-timeline query.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Timeline {
    pub id: Uuid,
    pub tenant_id: String,
    pub title: String,
    pub query: String,
    pub items: sqlx::types::Json<Vec<StoredTimelineItem>>,
    pub created_at: DateTime<Utc>,
}

/// Listing row without the item payload.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TimelineSummary {
    pub id: Uuid,
    pub title: String,
    pub query: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_item_serializes_to_stable_shape() {
        let item = TimelineItem {
            ts: Utc.with_ymd_and_hms(2023, 1, 7, 14, 17, 29).unwrap(),
            text: "Ordered 190 kW generator from Billy Smith.".to_string(),
            url: "https://t.me/c/1234567890/42".to_string(),
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "ts": "2023-01-07T14:17:29Z",
                "text": "Ordered 190 kW generator from Billy Smith.",
                "url": "https://t.me/c/1234567890/42",
            })
        );
    }

    #[test]
    fn test_stored_item_round_trips_through_json() {
        let stored = StoredTimelineItem {
            ts: Utc.with_ymd_and_hms(2023, 1, 7, 14, 17, 29).unwrap(),
            text: "Ordered".to_string(),
            url: "https://t.me/c/1/2".to_string(),
            chunk_id: Uuid::now_v7(),
        };
        let json = serde_json::to_string(&stored).unwrap();
        let back: StoredTimelineItem = serde_json::from_str(&json).unwrap();
        assert_eq!(back, stored);
    }

    #[test]
    fn test_public_projection_drops_chunk_reference() {
        let stored = StoredTimelineItem {
            ts: Utc.with_ymd_and_hms(2023, 1, 7, 14, 17, 29).unwrap(),
            text: "Ordered".to_string(),
            url: "https://t.me/c/1/2".to_string(),
            chunk_id: Uuid::now_v7(),
        };
        let json = serde_json::to_value(stored.to_public()).unwrap();
        assert!(json.get("chunk_id").is_none());
    }
}
