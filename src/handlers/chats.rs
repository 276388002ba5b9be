//! Chat listing handler.
//!
//! Handlers follow the thin-layer pattern: they validate inputs, delegate to
//! services and queries, and return responses.

use axum::{Json, extract::State};
use axum::extract::Extension;

use crate::{
    error::{Error, Result},
    middleware::tenant::AuthenticatedTenant,
    queries::chats,
    state::AppState,
};

/// GET /api/v1/chats
///
/// Lists the tenant's Telegram chats. The upstream list is authoritative and
/// refreshes stored associations; when the upstream is unavailable the
/// stored list is served instead so an indexed corpus stays browsable.
pub async fn list_chats(
    State(state): State<AppState>,
    Extension(tenant): Extension<AuthenticatedTenant>,
) -> Result<Json<serde_json::Value>> {
    let mut conn = state
        .pool
        .acquire()
        .await
        .map_err(|e| Error::Internal(format!("Failed to acquire database connection: {}", e)))?;

    match state.telegram.list_chats(&tenant.id).await {
        Ok(remote_chats) => {
            let mut stored = Vec::with_capacity(remote_chats.len());
            for remote in &remote_chats {
                stored.push(chats::upsert_chat(&mut conn, &tenant.id, remote).await?);
            }
            Ok(Json(serde_json::json!({
                "chats": stored,
                "count": stored.len(),
            })))
        }
        Err(error) => {
            tracing::warn!(
                tenant_id = %tenant.id,
                error = %error,
                "telegram chat list unavailable; serving stored chats"
            );
            let stored = chats::tenant_chats(&mut conn, &tenant.id).await?;
            Ok(Json(serde_json::json!({
                "chats": stored,
                "count": stored.len(),
                "stale": true,
            })))
        }
    }
}
