/// Crate-wide result type for cache operations.
pub type Result<T> = std::result::Result<T, FetchError>;

/// Typed failures of a media download.
///
/// Callers treat any of these as "the attachment is absent"; a fetch
/// failure never propagates past the normalization boundary.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Transport fault or timeout while talking to the source host.
    #[error(transparent)]
    Request(#[from] reqwest::Error),

    /// The source host answered with a non-success status.
    #[error("media download failed: HTTP {status}")]
    Status { status: reqwest::StatusCode },

    /// Reading or writing the cache directory failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
