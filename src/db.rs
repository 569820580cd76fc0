use deadpool_postgres::{Config as PoolConfig, Pool, Runtime};
use tokio_postgres::NoTls;

use crate::error::AppError;

const INIT_SQL: &str = include_str!("../migrations/001_init.sql");

pub async fn init_pool(database_url: &str) -> Result<Pool, AppError> {
    let mut cfg = PoolConfig::new();
    cfg.url = Some(database_url.to_string());

    let pool = cfg
        .create_pool(Some(Runtime::Tokio1), NoTls)
        .map_err(|e| AppError::StartServer(format!("create pool: {e}")))?;

    run_migrations(&pool).await?;
    Ok(pool)
}

async fn run_migrations(pool: &Pool) -> Result<(), AppError> {
    let client = pool.get().await?;
    client.batch_execute(INIT_SQL).await?;
    tracing::info!("database schema up to date");
    Ok(())
}
