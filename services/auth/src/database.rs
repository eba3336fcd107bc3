//! Schema migrations for the authentication service

use common::error::{DatabaseError, DatabaseResult};
use sqlx::PgPool;
use tracing::{error, info};

/// Apply the embedded migrations under `migrations/`
pub async fn run_migrations(pool: &PgPool) -> DatabaseResult<()> {
    sqlx::migrate!("./migrations").run(pool).await.map_err(|e| {
        error!("Failed to run migrations: {}", e);
        DatabaseError::Migration(e.to_string())
    })?;

    info!("Database migrations applied");
    Ok(())
}
