use thiserror::Error;

/// Failures surfaced by the track store.
///
/// `UnknownTrack` and `Validation` are caller mistakes and are never retried.
/// `Io` wraps anything the persistence layer reported; the store does not retry
/// those either, the caller decides.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unknown track '{0}'")]
    UnknownTrack(String),

    #[error("invalid snapshot: {0}")]
    Validation(String),

    #[error("storage I/O failure: {0}")]
    Io(#[from] IoFailure),
}

#[derive(Debug, Error)]
pub enum IoFailure {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("filesystem: {0}")]
    Fs(#[from] std::io::Error),

    #[error("encoding: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Io(IoFailure::Sqlite(e))
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(IoFailure::Fs(e))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Io(IoFailure::Encoding(e))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
