use deadpool_postgres::tokio_postgres::{Config as PgConfig, NoTls};
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use std::time::Duration;
use tracing::info;

use crate::config::Config;
use crate::error::AppError;
use crate::migrations;

/// Build the pool, verify a connection, and apply migrations
pub async fn init_pool(config: &Config) -> Result<Pool, AppError> {
    let pg_config: PgConfig = config
        .database_url
        .parse()
        .map_err(|e| AppError::Config(format!("DATABASE_URL: {e}")))?;

    let mgr_config = ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    };
    let mgr = Manager::from_config(pg_config, NoTls, mgr_config);
    let pool = Pool::builder(mgr)
        .max_size(config.db_max_connections)
        .build()
        .map_err(|e| AppError::StartServer(format!("db pool: {e}")))?;

    tokio::time::timeout(Duration::from_secs(config.db_connect_timeout_secs), async {
        let client = pool.get().await?;
        client.simple_query("SELECT 1").await?;
        Ok::<(), AppError>(())
    })
    .await
    .map_err(|_| AppError::StartServer("database connect timed out".into()))??;

    info!(
        max_connections = config.db_max_connections,
        "Database pool created and verified"
    );

    migrations::run_all(&pool).await?;
    Ok(pool)
}
