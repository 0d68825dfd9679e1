use thiserror::Error;

/// Store error taxonomy. Constraint violations are typed so callers can
/// re-prompt instead of treating them as generic failures.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("validation: {0}")]
    Validation(String),

    #[error("foreign key violation: {0}")]
    ForeignKey(String),

    #[error("transaction failure: {0}")]
    Fatal(String),

    #[error("database error: {0}")]
    Database(rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(ffi_err, msg) => {
                // SQLITE_CONSTRAINT_* extended result codes
                match ffi_err.extended_code {
                    // UNIQUE / PRIMARYKEY
                    2067 | 1555 => {
                        StoreError::Conflict(msg.clone().unwrap_or_else(|| err.to_string()))
                    }
                    // FOREIGNKEY
                    787 => {
                        StoreError::ForeignKey(msg.clone().unwrap_or_else(|| err.to_string()))
                    }
                    _ => StoreError::Database(err),
                }
            }
            rusqlite::Error::QueryReturnedNoRows => {
                StoreError::NotFound("query returned no rows".to_string())
            }
            _ => StoreError::Database(err),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
