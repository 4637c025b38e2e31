//! Error types for tarn-db.

use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum DbError {
    #[error("Database connection failed: {0}")]
    #[diagnostic(
        code(tarn_db::connection),
        help("Check if the database file exists and is accessible")
    )]
    ConnectionError(String),

    #[error("Database query failed: {0}")]
    #[diagnostic(code(tarn_db::query))]
    QueryError(String),

    #[error("Record already exists: {0}")]
    #[diagnostic(code(tarn_db::unique_violation))]
    UniqueViolation(String),

    #[error("Database migration failed: {0}")]
    #[diagnostic(
        code(tarn_db::migration),
        help("The database schema may be corrupted. Remove the file to rebuild the cache.")
    )]
    MigrationError(String),

    #[error("Database is closed")]
    #[diagnostic(code(tarn_db::closed))]
    Closed,

    #[error("Database lock poisoned")]
    #[diagnostic(
        code(tarn_db::poison),
        help("This is an internal error, please report it")
    )]
    PoisonError,
}

impl From<diesel::result::Error> for DbError {
    fn from(err: diesel::result::Error) -> Self {
        use diesel::result::{DatabaseErrorKind, Error};

        match err {
            Error::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                DbError::UniqueViolation(info.message().to_string())
            }
            Error::DatabaseError(_, info) => DbError::QueryError(info.message().to_string()),
            other => DbError::QueryError(other.to_string()),
        }
    }
}

impl From<diesel::result::ConnectionError> for DbError {
    fn from(err: diesel::result::ConnectionError) -> Self {
        DbError::ConnectionError(err.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for DbError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        DbError::PoisonError
    }
}

pub type Result<T> = std::result::Result<T, DbError>;
