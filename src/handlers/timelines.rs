//! Saved timeline handlers.

use axum::{
    Json,
    extract::{Extension, Path, State},
};
use uuid::Uuid;

use crate::{
    error::{Error, Result},
    middleware::tenant::AuthenticatedTenant,
    queries::timelines,
    state::AppState,
};

/// GET /api/v1/timelines
///
/// Lists the tenant's saved timelines, newest first.
pub async fn list_timelines(
    State(state): State<AppState>,
    Extension(tenant): Extension<AuthenticatedTenant>,
) -> Result<Json<serde_json::Value>> {
    let mut conn = state
        .pool
        .acquire()
        .await
        .map_err(|e| Error::Internal(format!("Failed to acquire database connection: {}", e)))?;

    let summaries = timelines::list(&mut conn, &tenant.id).await?;

    Ok(Json(serde_json::json!({
        "timelines": summaries,
        "count": summaries.len(),
    })))
}

/// GET /api/v1/timelines/{id}
///
/// Returns a saved timeline with its items in the stable public shape.
pub async fn get_timeline(
    State(state): State<AppState>,
    Extension(tenant): Extension<AuthenticatedTenant>,
    Path(timeline_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>> {
    let mut conn = state
        .pool
        .acquire()
        .await
        .map_err(|e| Error::Internal(format!("Failed to acquire database connection: {}", e)))?;

    let timeline = timelines::get(&mut conn, &tenant.id, timeline_id).await?;
    let items: Vec<_> = timeline.items.0.iter().map(|item| item.to_public()).collect();

    Ok(Json(serde_json::json!({
        "id": timeline.id,
        "title": timeline.title,
        "query": timeline.query,
        "created_at": timeline.created_at,
        "items": items,
    })))
}
