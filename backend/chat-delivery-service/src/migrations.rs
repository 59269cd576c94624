use deadpool_postgres::Pool;

use crate::error::AppError;

// Embed SQL migrations at compile time for deterministic startup
const MIG_0001: &str = include_str!("../migrations/0001_create_messages.sql");
const MIG_0002: &str = include_str!("../migrations/0002_index_unread_messages.sql");

/// Apply every migration in order. Statements are idempotent (`IF NOT EXISTS`),
/// so reapplying on each start is safe.
pub async fn run_all(db: &Pool) -> Result<(), AppError> {
    let client = db.get().await?;
    for (i, sql) in [MIG_0001, MIG_0002].into_iter().enumerate() {
        let label = i + 1;
        client.batch_execute(sql).await.map_err(|e| {
            tracing::error!(migration = %label, error = %e, "migration failed");
            AppError::StartServer(format!("migration {label}: {e}"))
        })?;
        tracing::info!(migration = %label, "chat-delivery-service migration applied");
    }
    Ok(())
}
