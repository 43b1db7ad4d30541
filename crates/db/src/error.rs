//! Typed error type for the db crate.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// The targeted row doesn't exist.
    #[error("{table} row {id} not found")]
    NotFound { table: &'static str, id: Uuid },

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}
