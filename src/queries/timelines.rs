use uuid::Uuid;

use crate::{
    DbConn,
    error::{Error, Result},
    models::timelines::{StoredTimelineItem, Timeline, TimelineSummary},
};

/// Persists a timeline under a tenant.
pub async fn save(
    conn: &mut DbConn,
    tenant_id: &str,
    title: &str,
    query: &str,
    items: &[StoredTimelineItem],
) -> Result<Timeline> {
    let timeline = sqlx::query_as::<_, Timeline>(
        r#"
        INSERT INTO timelines (id, tenant_id, title, query, items)
        VALUES (gen_random_uuid(), $1, $2, $3, $4)
        RETURNING id, tenant_id, title, query, items, created_at
        "#,
    )
    .bind(tenant_id)
    .bind(title)
    .bind(query)
    .bind(sqlx::types::Json(items))
    .fetch_one(conn)
    .await
    .map_err(Error::Sqlx)?;

    Ok(timeline)
}

/// Lists a tenant's saved timelines, newest first, without item payloads.
pub async fn list(conn: &mut DbConn, tenant_id: &str) -> Result<Vec<TimelineSummary>> {
    let summaries = sqlx::query_as::<_, TimelineSummary>(
        r#"
        SELECT id, title, query, created_at
        FROM timelines
        WHERE tenant_id = $1
        ORDER BY created_at DESC
        "#,
    )
    .bind(tenant_id)
    .fetch_all(conn)
    .await
    .map_err(Error::Sqlx)?;

    Ok(summaries)
}

/// Gets a saved timeline scoped to its owning tenant.
pub async fn get(conn: &mut DbConn, tenant_id: &str, timeline_id: Uuid) -> Result<Timeline> {
    sqlx::query_as::<_, Timeline>(
        r#"
        SELECT id, tenant_id, title, query, items, created_at
        FROM timelines
        WHERE tenant_id = $1 AND id = $2
        "#,
    )
    .bind(tenant_id)
    .bind(timeline_id)
    .fetch_optional(conn)
    .await
    .map_err(Error::Sqlx)?
    .ok_or_else(|| Error::NotFound(format!("Timeline {} not found", timeline_id)))
}
