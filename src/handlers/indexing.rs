//! Indexing job handlers: submission, progress polling, cancellation.

use axum::{
    Json,
    extract::{Extension, Path, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::{
    error::{Error, Result},
    middleware::tenant::AuthenticatedTenant,
    models::requests::{SubmitIndexingRequest, SubmitIndexingResponse},
    queries::jobs,
    services::indexing,
    state::AppState,
};

/// POST /api/v1/index
///
/// Submits an indexing job over the given chats. One job per tenant runs at
/// a time; submitting while one is active returns the existing job id with
/// `created: false`.
pub async fn submit_indexing(
    State(state): State<AppState>,
    Extension(tenant): Extension<AuthenticatedTenant>,
    Json(request): Json<SubmitIndexingRequest>,
) -> Result<(StatusCode, Json<SubmitIndexingResponse>)> {
    let (job_id, created) = indexing::submit(
        &state.pool,
        &state.job_tx,
        &tenant.id,
        request.chat_ids,
    )
    .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitIndexingResponse { job_id, created }),
    ))
}

/// GET /api/v1/jobs/{id}
///
/// Returns the job with its progress counters. Jobs in `failed` state remain
/// queryable for audit; a cross-tenant id reads as not found.
pub async fn get_job(
    State(state): State<AppState>,
    Extension(tenant): Extension<AuthenticatedTenant>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>> {
    let mut conn = state
        .pool
        .acquire()
        .await
        .map_err(|e| Error::Internal(format!("Failed to acquire database connection: {}", e)))?;

    let job = jobs::get_job(&mut conn, &tenant.id, job_id).await?;

    Ok(Json(serde_json::json!({ "job": job })))
}

/// DELETE /api/v1/jobs/{id}
///
/// Cooperative cancel: in-flight provider calls finish, then the job lands
/// in `failed` with reason "canceled".
pub async fn cancel_job(
    State(state): State<AppState>,
    Extension(tenant): Extension<AuthenticatedTenant>,
    Path(job_id): Path<Uuid>,
) -> Result<StatusCode> {
    indexing::cancel(&state.pool, &state.jobs, &tenant.id, job_id).await?;
    Ok(StatusCode::ACCEPTED)
}
