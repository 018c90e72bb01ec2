use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::config::Config;
use crate::error::{AppError, AppResult};

pub async fn create_pool(config: &Config) -> AppResult<PgPool> {
    let url = config.database_url();
    let pool = PgPoolOptions::new()
        .min_connections(config.db.pool_min)
        .max_connections(config.db.pool_max)
        .acquire_timeout(std::time::Duration::from_secs(10))
        .connect(&url)
        .await?;
    Ok(pool)
}

pub async fn run_migrations(pool: &PgPool) -> AppResult<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| AppError::Internal(format!("Migration failed: {e}")))?;
    Ok(())
}
