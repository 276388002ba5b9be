use std::time::Duration;
use tokio::time::interval;
use tracing::{error, info, warn};

use crate::queries::messages;

/// Background worker that garbage-collects messages no tenant can see.
///
/// A message's lifetime is the longest-holding tenant's membership; once the
/// last membership row is gone, the message and its chunks and embeddings
/// are reclaimable. Runs hourly.
pub async fn orphan_cleanup_worker(
    pool: sqlx::PgPool,
    mut shutdown_rx: tokio::sync::broadcast::Receiver<()>,
) {
    let mut cleanup_interval = interval(Duration::from_secs(3600));
    info!("orphan message cleanup worker started (runs hourly)");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("orphan message cleanup worker shutting down");
                break;
            }
            _ = cleanup_interval.tick() => {
                let mut conn = match pool.acquire().await {
                    Ok(conn) => conn,
                    Err(e) => {
                        error!("Failed to acquire database connection for cleanup: {}", e);
                        continue;
                    }
                };

                match messages::purge_orphan_messages(&mut conn).await {
                    Ok(count) => {
                        if count > 0 {
                            info!("Garbage-collected {} orphaned messages", count);
                        }
                    }
                    Err(e) => {
                        warn!("Failed to garbage-collect orphaned messages: {}", e);
                    }
                }
            }
        }
    }

    info!("orphan message cleanup worker stopped");
}
