use std::error::Error;
use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by storage backends regardless of the underlying transport.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend could not be reached or refused the operation.
    #[error("storage unavailable: {message}")]
    Unavailable {
        /// What was being attempted.
        message: String,
        /// Transport-level cause.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// The backend answered, but the payload did not parse.
    #[error("stored payload could not be decoded: {message}")]
    Decode {
        /// What was being decoded.
        message: String,
        /// Parser-level cause.
        #[source]
        source: Box<dyn Error + Send + Sync>,
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

    /// Construct a decode error for a payload that came back malformed.
    pub fn decode(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Decode {
            message,
            source: Box::new(source),
        }
    }
}
