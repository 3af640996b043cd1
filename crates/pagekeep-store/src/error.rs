use pagekeep_shared::DocumentError;
use rusqlite::ffi;
use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error not covered by a more specific variant.
    #[error("Database error: {0}")]
    Sqlite(rusqlite::Error),

    /// A row-security trigger refused the statement.
    #[error("Row security policy violation: {0}")]
    PolicyViolation(String),

    /// Generic I/O error (e.g. creating the database directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The requested row does not exist or is not visible to the caller.
    #[error("Record not found")]
    NotFound,

    /// A row with the same primary key already exists.
    #[error("Record already exists")]
    AlreadyExists,

    /// Caller-supplied data failed a required-field check.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Page content failed structural validation.
    #[error("Invalid document: {0}")]
    Document(#[from] DocumentError),

    /// Stored JSON could not be (de)serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),

    /// UUID parsing error.
    #[error("UUID error: {0}")]
    Uuid(#[from] uuid::Error),

    /// Chrono parsing error.
    #[error("Timestamp parse error: {0}")]
    ChronoParse(#[from] chrono::ParseError),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
            rusqlite::Error::SqliteFailure(code, msg) => match code.extended_code {
                ffi::SQLITE_CONSTRAINT_PRIMARYKEY => StoreError::AlreadyExists,
                ffi::SQLITE_CONSTRAINT_TRIGGER => StoreError::PolicyViolation(
                    msg.clone().unwrap_or_else(|| "rejected by trigger".to_string()),
                ),
                _ => StoreError::Sqlite(err),
            },
            _ => StoreError::Sqlite(err),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
