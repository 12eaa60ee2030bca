//! Unified error types for the resize service.
//!
//! The `Display` prefix of each variant is a stable code that ends up in logs
//! and in the `X-Info` diagnostic header.

use tokio_rusqlite::rusqlite;

/// Unified error types for the resize service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Bad or missing resize dimensions.
    #[error("INVALID_PARAMS: {0}")]
    InvalidParams(String),

    /// The source URL could not be normalized.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// Database operation failed.
    #[error("CACHE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("CACHE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// Filesystem error while preparing the store.
    #[error("IO_ERROR: {0}")]
    Io(#[from] std::io::Error),

    /// Store stayed busy or failing for every retry attempt.
    #[error("STORE_UNAVAILABLE: gave up after {attempts} attempts: {source}")]
    StoreUnavailable {
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    /// Network-level failure talking to the upstream.
    #[error("FETCH_FAILED: {0}")]
    FetchFailed(String),

    /// Upstream did not answer within the configured timeout.
    #[error("FETCH_TIMEOUT: {0}")]
    FetchTimeout(String),

    /// Upstream body exceeded the configured byte limit.
    #[error("FETCH_TOO_LARGE: {0}")]
    FetchTooLarge(String),

    /// Upstream answered with a non-success status.
    #[error("UPSTREAM_STATUS: status={0}")]
    UpstreamStatus(u16),

    /// Upstream answered 2xx with no bytes.
    #[error("EMPTY_BODY")]
    EmptyBody,

    /// Bytes could not be decoded as an image.
    #[error("DECODE_FAILED: {0}")]
    DecodeFailed(String),

    /// The planned resize would allocate more pixels than allowed.
    #[error("OUTPUT_TOO_LARGE: {0}")]
    OutputTooLarge(String),

    /// Every encoder in the fallback chain failed.
    #[error("ENCODE_FAILED: {0}")]
    EncodeFailed(String),
}

impl Error {
    /// Whether this error came from the persistent store.
    pub fn is_store_error(&self) -> bool {
        matches!(self, Error::Database(_) | Error::MigrationFailed(_) | Error::StoreUnavailable { .. })
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}
