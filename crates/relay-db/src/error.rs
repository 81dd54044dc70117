use thiserror::Error;

/// Errors surfaced by every DAO call in this crate.
///
/// One variant per failure class, with `#[from]` conversions so call sites
/// can use `?`.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("not found")]
    NotFound,

    #[error("constraint violation: {0}")]
    Conflict(String),

    #[error("invalid input: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, DbError>;
