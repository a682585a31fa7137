use std::{error::Error, path::Path};
use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by storage backends regardless of the underlying medium.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to read `{path}`")]
    Read {
        path: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    #[error("failed to write `{path}`")]
    Write {
        path: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    #[error("failed to encode collection for `{path}`")]
    Encode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl StorageError {
    /// Construct a read error from any backend failure.
    pub fn read(path: &Path, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Read {
            path: path.display().to_string(),
            source: Box::new(source),
        }
    }

    /// Construct a write error from any backend failure.
    pub fn write(path: &Path, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Write {
            path: path.display().to_string(),
            source: Box::new(source),
        }
    }
}
