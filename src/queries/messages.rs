use uuid::Uuid;

use crate::{
    DbConn,
    error::{Error, Result},
    models::messages::IncomingMessage,
};

/// Inserts a message, idempotent on `(chat_id, message_seq)`.
///
/// Messages are immutable once ingested; the no-op update on conflict exists
/// only so `RETURNING id` yields the existing row's identity.
pub async fn upsert_message(conn: &mut DbConn, msg: &IncomingMessage) -> Result<Uuid> {
    let id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO messages
            (id, chat_id, message_seq, author_id, author_name, author_handle, sent_at, text, reply_to_seq)
        VALUES (gen_random_uuid(), $1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (chat_id, message_seq) DO UPDATE SET chat_id = EXCLUDED.chat_id
        RETURNING id
        "#,
    )
    .bind(msg.chat_id)
    .bind(msg.message_seq)
    .bind(msg.author_id)
    .bind(&msg.author_name)
    .bind(&msg.author_handle)
    .bind(msg.sent_at)
    .bind(&msg.text)
    .bind(msg.reply_to_seq)
    .fetch_one(conn)
    .await
    .map_err(Error::Sqlx)?;

    Ok(id)
}

/// Grants a tenant visibility over a message. Idempotent.
pub async fn add_membership(conn: &mut DbConn, tenant_id: &str, message_id: Uuid) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO message_tenants (tenant_id, message_id)
        VALUES ($1, $2)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(tenant_id)
    .bind(message_id)
    .execute(conn)
    .await
    .map_err(Error::Sqlx)?;

    Ok(())
}

/// Deletes messages no tenant holds a membership for, cascading to their
/// chunks and embeddings. Returns the number of messages removed.
pub async fn purge_orphan_messages(conn: &mut DbConn) -> Result<u64> {
    let result = sqlx::query(
        r#"
        DELETE FROM messages m
        WHERE NOT EXISTS (
            SELECT 1 FROM message_tenants mt WHERE mt.message_id = m.id
        )
        "#,
    )
    .execute(conn)
    .await
    .map_err(Error::Sqlx)?;

    Ok(result.rows_affected())
}
