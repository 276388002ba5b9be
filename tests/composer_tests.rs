//! Answer composition and timeline projection against a mock answer model.

mod common;

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use chatlore::models::chunks::ChunkMetadata;
use chatlore::services::composer::{
    ANSWER_SYSTEM_PROMPT, NO_RESULTS_ANSWER, answer, build_timeline_items,
};
use chatlore::services::retrieval::RetrievedChunk;
use common::MockLlm;

fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 1, 7, h, m, s).unwrap()
}

fn chunk(seq: i64, ts: DateTime<Utc>, text: &str) -> RetrievedChunk {
    RetrievedChunk {
        chunk_id: Uuid::now_v7(),
        text: text.to_string(),
        similarity: 0.87,
        metadata: ChunkMetadata {
            ts,
            chat_title: "Site ops".to_string(),
            chat_id: -1001234567890,
            message_seq: seq,
            author_name: "Colin".to_string(),
            author_handle: Some("colin_ops".to_string()),
            full_text: text.to_string(),
            reply_to_seq: None,
            reply_to_text: None,
            likely_answer_to: None,
            is_question: false,
            is_answer: false,
            chunk_index: 0,
            total_chunks: 1,
        },
        url: format!("https://t.me/c/1234567890/{}", seq),
    }
}

#[tokio::test]
async fn empty_retrieval_short_circuits_without_model_call() {
    let llm = MockLlm::responding("should never be used");
    let composed = answer(&llm, "what happened?", &[], 512, 4000).await;

    assert_eq!(composed.answer, NO_RESULTS_ANSWER);
    assert!(composed.sources.is_empty());
    assert!(composed.note.is_none());
    assert_eq!(llm.call_count(), 0);
}

#[tokio::test]
async fn answer_includes_sources_and_grounded_prompt() {
    let llm = MockLlm::responding(
        "The generator was ordered on January 7th. source:https://t.me/c/1234567890/42",
    );
    let retrieved = vec![
        chunk(42, at(14, 17, 29), "Ordered 190 kW generator from Billy Smith."),
        chunk(57, at(15, 2, 0), "Generator delivery slipped a week."),
    ];

    let composed = answer(&llm, "what happened with the generator?", &retrieved, 512, 4000).await;

    assert!(composed.answer.contains("January 7th"));
    assert_eq!(composed.sources.len(), 2);
    assert!(composed.note.is_none());
    assert_eq!(llm.call_count(), 1);

    let (system, user) = llm.last_prompt().unwrap();
    assert_eq!(system, ANSWER_SYSTEM_PROMPT);
    assert!(user.contains("what happened with the generator?"));
    assert!(user.contains("source:https://t.me/c/1234567890/42"));
    assert!(user.contains("source:https://t.me/c/1234567890/57"));
}

#[tokio::test]
async fn model_failure_degrades_to_retrieval_only() {
    let llm = MockLlm::failing();
    let retrieved = vec![chunk(42, at(14, 17, 29), "Ordered 190 kW generator.")];

    let composed = answer(&llm, "generator status?", &retrieved, 512, 4000).await;

    assert!(composed.answer.is_empty());
    assert_eq!(composed.sources.len(), 1);
    assert!(composed.note.is_some());
    assert_eq!(composed.sources[0].url, "https://t.me/c/1234567890/42");
}

#[tokio::test]
async fn answer_is_clipped_to_configured_length() {
    let llm = MockLlm::responding(&"long answer ".repeat(100));
    let retrieved = vec![chunk(42, at(14, 17, 29), "Ordered 190 kW generator.")];

    let composed = answer(&llm, "generator status?", &retrieved, 512, 50).await;
    assert_eq!(composed.answer.chars().count(), 50);
}

#[test]
fn timeline_json_matches_stable_shape() {
    let retrieved = vec![
        chunk(57, at(15, 2, 0), "Generator delivery slipped a week. "),
        chunk(42, at(14, 17, 29), "Ordered 190 kW generator from Billy Smith."),
    ];

    let items = build_timeline_items(&retrieved);
    let public: Vec<_> = items.iter().map(|item| item.to_public()).collect();
    let json = serde_json::to_value(&public).unwrap();

    assert_eq!(
        json,
        serde_json::json!([
            {
                "ts": "2023-01-07T14:17:29Z",
                "text": "Ordered 190 kW generator from Billy Smith.",
                "url": "https://t.me/c/1234567890/42",
            },
            {
                "ts": "2023-01-07T15:02:00Z",
                "text": "Generator delivery slipped a week.",
                "url": "https://t.me/c/1234567890/57",
            },
        ])
    );
}

#[test]
fn timeline_ordering_is_ascending_for_every_input_order() {
    let timestamps = [at(15, 0, 0), at(9, 0, 0), at(12, 30, 0), at(9, 0, 0)];
    let retrieved: Vec<_> = timestamps
        .iter()
        .enumerate()
        .map(|(i, ts)| chunk(i as i64, *ts, "event"))
        .collect();

    let items = build_timeline_items(&retrieved);
    assert!(items.windows(2).all(|w| w[0].ts <= w[1].ts));
}
