use std::error::Error;
use thiserror::Error;

/// Result alias for match store operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Backend-agnostic failure of a match store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend failed or could not be reached.
    #[error("match store unavailable: {message}")]
    Unavailable {
        /// Client-safe summary.
        message: String,
        /// Backend error.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

impl StorageError {
    /// Wrap any backend failure, keeping it as the error source.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_backend_error_as_source() {
        let io = std::io::Error::other("connection refused");
        let err = StorageError::unavailable("couch down".into(), io);
        assert_eq!(err.to_string(), "match store unavailable: couch down");
        assert_eq!(
            err.source().map(ToString::to_string).as_deref(),
            Some("connection refused")
        );
    }
}
