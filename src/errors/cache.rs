//! Error types for cache-store operations.

/// Errors raised by cache-store backends.
///
/// Note that a corrupt *entry* is not an error at this level: stores return
/// whatever blob they hold and the proxy treats an undecodable blob as a
/// miss. These errors cover the store itself failing.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Filesystem I/O failure in a disk-backed store.
    #[error("Cache I/O error at {path}: {details}")]
    Io {
        /// Path of the store file involved
        path: String,
        /// Details about the I/O failure
        details: String,
        /// The underlying I/O error, if available
        #[source]
        source: Option<std::io::Error>,
    },

    /// A cache entry could not be serialized for writing.
    #[error("Cache serialization error: {details}")]
    Serialization {
        /// Details about the serialization failure
        details: String,
        /// The underlying serialization error
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The store could not be reached.
    #[error("Cache store unavailable: {details}")]
    Unavailable {
        /// Connection-level details
        details: String,
    },
}

impl CacheError {
    /// Create an `Io` error from a path and an optional source.
    pub fn io(
        path: impl Into<String>,
        details: impl Into<String>,
        source: Option<std::io::Error>,
    ) -> Self {
        CacheError::Io {
            path: path.into(),
            details: details.into(),
            source,
        }
    }

    /// Create a `Serialization` error from any serialization failure.
    pub fn serialization(
        details: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        CacheError::Serialization {
            details: details.into(),
            source: Box::new(source),
        }
    }

    /// Create an `Unavailable` error with details.
    pub fn unavailable(details: impl Into<String>) -> Self {
        CacheError::Unavailable {
            details: details.into(),
        }
    }
}
