//! Cache Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A cache error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The resource could not be fetched: non-success status, timeout, or a
    /// transport failure (`status` is `None` for the latter two). Try another
    /// resource.
    #[display("fetch failed ({}): {url}", status.map_or_else(|| "no response".to_string(), |s| s.to_string()))]
    FetchFailed { url: String, status: Option<u16> },
    /// The resource is smaller than the requested slice.
    #[display("short read: {url} has {size} bytes, wanted {length} at offset {offset}")]
    ShortRead { url: String, offset: u64, length: u64, size: u64 },
    /// The cache directory is unusable (not a directory, not creatable).
    #[display("invalid cache directory: {}", _0.display())]
    InvalidRoot(#[error(not(source))] PathBuf),
    /// HTTP client could not be constructed.
    #[display("HTTP client error")]
    Client,
    /// Local filesystem I/O failed (reading, writing or publishing a mirror).
    #[display("I/O error: {}", _0.display())]
    Io(#[error(not(source))] PathBuf),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::FetchFailed { .. } | Self::Io(_))
    }

    /// Returns `true` if the error means the resource itself is unavailable,
    /// as opposed to a local failure.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::FetchFailed { .. })
    }
}
