use crate::{
    DbConn,
    error::{Error, Result},
    models::chats::Chat,
    providers::RemoteChat,
};

/// Creates or refreshes a tenant's association with a chat.
/// Idempotent on `(tenant_id, chat_id)`; title and type track upstream.
pub async fn upsert_chat(conn: &mut DbConn, tenant_id: &str, remote: &RemoteChat) -> Result<Chat> {
    let chat = sqlx::query_as::<_, Chat>(
        r#"
        INSERT INTO chats (id, tenant_id, chat_id, title, chat_type)
        VALUES (gen_random_uuid(), $1, $2, $3, $4)
        ON CONFLICT (tenant_id, chat_id) DO UPDATE
        SET title = EXCLUDED.title, chat_type = EXCLUDED.chat_type, updated_at = NOW()
        RETURNING id, tenant_id, chat_id, title, chat_type, last_indexed_at, created_at, updated_at
        "#,
    )
    .bind(tenant_id)
    .bind(remote.chat_id)
    .bind(&remote.title)
    .bind(remote.chat_type)
    .fetch_one(conn)
    .await
    .map_err(Error::Sqlx)?;

    Ok(chat)
}

/// Lists all chats associated with a tenant.
pub async fn tenant_chats(conn: &mut DbConn, tenant_id: &str) -> Result<Vec<Chat>> {
    let chats = sqlx::query_as::<_, Chat>(
        r#"
        SELECT id, tenant_id, chat_id, title, chat_type, last_indexed_at, created_at, updated_at
        FROM chats
        WHERE tenant_id = $1
        ORDER BY title ASC
        "#,
    )
    .bind(tenant_id)
    .fetch_all(conn)
    .await
    .map_err(Error::Sqlx)?;

    Ok(chats)
}

/// Gets the display title for one of the tenant's chats, if known.
pub async fn chat_title(conn: &mut DbConn, tenant_id: &str, chat_id: i64) -> Result<Option<String>> {
    let title: Option<String> = sqlx::query_scalar(
        r#"
        SELECT title FROM chats WHERE tenant_id = $1 AND chat_id = $2
        "#,
    )
    .bind(tenant_id)
    .bind(chat_id)
    .fetch_optional(conn)
    .await
    .map_err(Error::Sqlx)?;

    Ok(title)
}

/// Stamps a chat as indexed now.
pub async fn touch_last_indexed(conn: &mut DbConn, tenant_id: &str, chat_id: i64) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE chats SET last_indexed_at = NOW(), updated_at = NOW()
        WHERE tenant_id = $1 AND chat_id = $2
        "#,
    )
    .bind(tenant_id)
    .bind(chat_id)
    .execute(conn)
    .await
    .map_err(Error::Sqlx)?;

    Ok(())
}
