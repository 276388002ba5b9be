//! Query handlers: grounded answers and chronological timelines.

use axum::{
    Json,
    extract::{Extension, State},
};
use std::time::Duration;

use crate::{
    error::{Error, Result},
    middleware::tenant::AuthenticatedTenant,
    models::requests::{AnswerResponse, QueryRequest, TimelineResponse},
    queries::{chunks::SearchFilters, timelines},
    services::{composer, retrieval, sanitizer},
    state::AppState,
};

/// Safe generic refusal used to soft-fail flagged queries without reaching
/// the language model.
const REFUSAL_ANSWER: &str =
    "That request cannot be answered. Try asking a question about your chat history.";

fn filters_from(request: &QueryRequest) -> SearchFilters {
    SearchFilters {
        chat_ids: request.chat_ids.clone(),
        ..SearchFilters::default()
    }
}

async fn with_deadline<F, T>(state: &AppState, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let deadline = Duration::from_secs(state.config.query.deadline_seconds);
    tokio::time::timeout(deadline, fut)
        .await
        .map_err(|_| Error::UpstreamUnavailable("query deadline exceeded".to_string()))?
}

/// POST /api/v1/query/answer
///
/// Sanitizes the query, retrieves the closest chunks for the tenant, and
/// composes a cited answer. A flagged query soft-fails with a generic
/// refusal; an LLM outage degrades to retrieval-only results with a note.
pub async fn query_answer(
    State(state): State<AppState>,
    Extension(tenant): Extension<AuthenticatedTenant>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<AnswerResponse>> {
    let sanitized = match sanitizer::sanitize_query(&request.text, state.config.query.max_length) {
        Ok(query) => query,
        Err(Error::SuspiciousQuery(_)) => {
            return Ok(Json(AnswerResponse {
                answer: REFUSAL_ANSWER.to_string(),
                sources: Vec::new(),
                note: Some("The query was flagged by the input filter.".to_string()),
            }));
        }
        Err(error) => return Err(error),
    };

    let filters = filters_from(&request);
    let response = with_deadline(&state, async {
        let mut conn = state.pool.acquire().await.map_err(|e| {
            Error::Internal(format!("Failed to acquire database connection: {}", e))
        })?;

        let retrieved = retrieval::search(
            &mut conn,
            state.embedder.as_ref(),
            &state.config.retrieval,
            state.config.ai.embedding_dimension,
            &tenant.id,
            &sanitized,
            &filters,
        )
        .await?;

        let composed = composer::answer(
            state.completer.as_ref(),
            &sanitized,
            &retrieved,
            state.config.ai.answer_max_output_tokens,
            state.config.query.answer_max_chars,
        )
        .await;

        Ok(AnswerResponse {
            answer: composed.answer,
            sources: composed.sources,
            note: composed.note,
        })
    })
    .await?;

    Ok(Json(response))
}

/// POST /api/v1/query/timeline
///
/// Retrieves event-bearing chunks and projects them into a timeline sorted
/// ascending by timestamp. With a `title`, the timeline is persisted.
pub async fn query_timeline(
    State(state): State<AppState>,
    Extension(tenant): Extension<AuthenticatedTenant>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<TimelineResponse>> {
    let sanitized = sanitizer::sanitize_query(&request.text, state.config.query.max_length)?;

    let filters = filters_from(&request);
    let response = with_deadline(&state, async {
        let mut conn = state.pool.acquire().await.map_err(|e| {
            Error::Internal(format!("Failed to acquire database connection: {}", e))
        })?;

        let retrieved = retrieval::search(
            &mut conn,
            state.embedder.as_ref(),
            &state.config.retrieval,
            state.config.ai.embedding_dimension,
            &tenant.id,
            &sanitized,
            &filters,
        )
        .await?;

        let items = composer::build_timeline_items(&retrieved);

        let timeline_id = match &request.title {
            Some(title) if !title.trim().is_empty() => {
                let saved =
                    timelines::save(&mut conn, &tenant.id, title.trim(), &sanitized, &items)
                        .await?;
                Some(saved.id)
            }
            _ => None,
        };

        Ok(TimelineResponse {
            items: items.iter().map(|item| item.to_public()).collect(),
            timeline_id,
        })
    })
    .await?;

    Ok(Json(response))
}
