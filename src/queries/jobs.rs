use uuid::Uuid;

use crate::{
    DbConn,
    error::{Error, Result},
    models::jobs::{IndexingJob, JobStatus},
};

const JOB_COLUMNS: &str = "id, tenant_id, chat_ids, status, messages_total, messages_processed, \
     chunks_produced, embeddings_completed, embeddings_failed, last_error, started_at, updated_at";

/// Absolute counter values maintained by the owning coordinator.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProgressCounters {
    pub messages_total: Option<i64>,
    pub messages_processed: i64,
    pub chunks_produced: i64,
    pub embeddings_completed: i64,
    pub embeddings_failed: i64,
}

/// Returns the tenant's non-terminal job, if any.
pub async fn get_active_job(conn: &mut DbConn, tenant_id: &str) -> Result<Option<IndexingJob>> {
    let job = sqlx::query_as::<_, IndexingJob>(&format!(
        r#"
        SELECT {JOB_COLUMNS}
        FROM indexing_jobs
        WHERE tenant_id = $1 AND status NOT IN ('completed', 'failed')
        "#
    ))
    .bind(tenant_id)
    .fetch_optional(conn)
    .await
    .map_err(Error::Sqlx)?;

    Ok(job)
}

/// Creates a pending job, or returns the tenant's already-active job.
///
/// The single-active-job invariant is enforced by a partial unique index on
/// `tenant_id` over non-terminal statuses; a concurrent submission loses the
/// insert race and falls back to reading the winner's row. The boolean is
/// true when a new job was created.
pub async fn create_job(
    conn: &mut DbConn,
    tenant_id: &str,
    chat_ids: &[i64],
) -> Result<(IndexingJob, bool)> {
    if let Some(active) = get_active_job(conn, tenant_id).await? {
        return Ok((active, false));
    }

    let inserted = sqlx::query_as::<_, IndexingJob>(&format!(
        r#"
        INSERT INTO indexing_jobs (id, tenant_id, chat_ids, status)
        VALUES (gen_random_uuid(), $1, $2, 'pending')
        RETURNING {JOB_COLUMNS}
        "#
    ))
    .bind(tenant_id)
    .bind(chat_ids)
    .fetch_one(&mut *conn)
    .await;

    match inserted {
        Ok(job) => Ok((job, true)),
        Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
            let existing = get_active_job(conn, tenant_id).await?.ok_or_else(|| {
                Error::Internal("active job vanished during conditional create".to_string())
            })?;
            Ok((existing, false))
        }
        Err(e) => Err(Error::Sqlx(e)),
    }
}

/// Gets a job scoped to its owning tenant.
/// Cross-tenant ids are indistinguishable from unknown ones.
pub async fn get_job(conn: &mut DbConn, tenant_id: &str, job_id: Uuid) -> Result<IndexingJob> {
    sqlx::query_as::<_, IndexingJob>(&format!(
        r#"
        SELECT {JOB_COLUMNS}
        FROM indexing_jobs
        WHERE tenant_id = $1 AND id = $2
        "#
    ))
    .bind(tenant_id)
    .bind(job_id)
    .fetch_optional(conn)
    .await
    .map_err(Error::Sqlx)?
    .ok_or_else(|| Error::NotFound(format!("Indexing job {} not found", job_id)))
}

/// Advances a job's status, validating the transition against the lifecycle.
/// Only the owning coordinator calls this; an invalid transition is an
/// invariant violation and fails loud.
pub async fn update_status(
    conn: &mut DbConn,
    job_id: Uuid,
    next: JobStatus,
    last_error: Option<&str>,
) -> Result<()> {
    let current: Option<JobStatus> =
        sqlx::query_scalar("SELECT status FROM indexing_jobs WHERE id = $1")
            .bind(job_id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(Error::Sqlx)?;

    let current =
        current.ok_or_else(|| Error::Internal(format!("Job {} missing on status update", job_id)))?;

    if !current.can_transition_to(next) {
        return Err(Error::Internal(format!(
            "Invalid job transition {} -> {} for job {}",
            current, next, job_id
        )));
    }

    sqlx::query(
        r#"
        UPDATE indexing_jobs
        SET status = $2, last_error = COALESCE($3, last_error), updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(job_id)
    .bind(next)
    .bind(last_error)
    .execute(conn)
    .await
    .map_err(Error::Sqlx)?;

    Ok(())
}

/// Writes progress counters. `GREATEST` keeps every counter monotonically
/// non-decreasing regardless of write interleaving.
pub async fn bump_counters(
    conn: &mut DbConn,
    job_id: Uuid,
    counters: ProgressCounters,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE indexing_jobs
        SET messages_total = COALESCE($2, messages_total),
            messages_processed = GREATEST(messages_processed, $3),
            chunks_produced = GREATEST(chunks_produced, $4),
            embeddings_completed = GREATEST(embeddings_completed, $5),
            embeddings_failed = GREATEST(embeddings_failed, $6),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(job_id)
    .bind(counters.messages_total)
    .bind(counters.messages_processed)
    .bind(counters.chunks_produced)
    .bind(counters.embeddings_completed)
    .bind(counters.embeddings_failed)
    .execute(conn)
    .await
    .map_err(Error::Sqlx)?;

    Ok(())
}
