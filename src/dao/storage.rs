use std::error::Error;
use thiserror::Error;

use crate::dao::codes::CodeError;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by storage backends regardless of the underlying database.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend could not be reached or rejected the operation.
    #[error("storage unavailable: {message}")]
    Unavailable {
        /// What was being attempted.
        message: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// A row was read but holds values the domain cannot represent.
    #[error("invalid stored data: {message}")]
    InvalidData {
        /// Which row was rejected.
        message: String,
        #[source]
        source: CodeError,
    },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }

    /// Construct an invalid-data error for a row that failed code conversion.
    pub fn invalid(message: impl Into<String>, source: CodeError) -> Self {
        StorageError::InvalidData {
            message: message.into(),
            source,
        }
    }
}
