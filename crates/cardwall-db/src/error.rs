use rusqlite::ErrorCode;
use rusqlite::ffi;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("record not found")]
    NotFound,

    #[error("card is already liked by this user")]
    AlreadyLiked,

    #[error("card is not liked by this user")]
    NotLiked,

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("already exists: {0}")]
    Conflict(String),

    #[error("database lock poisoned: {0}")]
    LockPoisoned(String),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, DbError>;

pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == ErrorCode::ConstraintViolation
                && matches!(
                    e.extended_code,
                    ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                )
    )
}
