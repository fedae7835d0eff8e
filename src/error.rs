// ⚠️ Service Errors - the four failure kinds every operation can surface
//
// Store errors never render the underlying SQLite message: callers see an
// opaque "store failure", logs get the full chain through `source()`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// Batch resolution during import found no batch with this canonical name
    #[error("batch \"{batch}\" not found")]
    NotFound { batch: String },

    /// Missing or malformed input (blank batch name, bad CSV value, ...)
    #[error("validation failed: {0}")]
    Validation(String),

    /// Source file unreadable, document unparseable, output not writable
    #[error("I/O failure: {0}")]
    Io(String),

    #[error("store failure")]
    Store(#[from] rusqlite::Error),
}

impl ServiceError {
    pub fn not_found(batch: impl Into<String>) -> Self {
        ServiceError::NotFound {
            batch: batch.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ServiceError::Validation(message.into())
    }

    pub fn io(message: impl Into<String>) -> Self {
        ServiceError::Io(message.into())
    }

    /// Short machine-readable kind, used in API error bodies and logs
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::NotFound { .. } => "not_found",
            ServiceError::Validation(_) => "validation_error",
            ServiceError::Io(_) => "io_failure",
            ServiceError::Store(_) => "store_failure",
        }
    }
}

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;
