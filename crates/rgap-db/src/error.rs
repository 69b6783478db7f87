//! Database error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("duplicate: {0}")]
    Duplicate(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl DbError {
    /// Map constraint violations on writes touching `what` onto the
    /// corresponding variants; other errors pass through.
    pub(crate) fn on_write(err: sqlx::Error, what: impl Into<String>) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return DbError::Duplicate(what.into());
            }
            if db_err.is_foreign_key_violation() {
                return DbError::NotFound(what.into());
            }
        }
        DbError::Database(err)
    }
}

pub type DbResult<T> = std::result::Result<T, DbError>;
