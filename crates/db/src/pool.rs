//! Postgres connection pool.

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use crate::DbError;

/// Type alias for the shared Postgres pool used across the whole application.
pub type DbPool = PgPool;

/// How long a caller waits for a free connection before giving up.
pub const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Create a new connection pool from the given `database_url`.
///
/// `max_connections` controls the pool ceiling.
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<DbPool, DbError> {
    info!(max_connections, "connecting to execution store");
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Run the embedded migrations in `<workspace>/migrations`
/// (`workflow_executions` and `step_logs`).
pub async fn run_migrations(pool: &DbPool) -> Result<(), DbError> {
    info!("applying execution store migrations");
    sqlx::migrate!("../../migrations").run(pool).await?;
    Ok(())
}
