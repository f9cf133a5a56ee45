//! Compression Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction.

use derive_more::{Display, Error};

/// A compression error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for compression operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// A codec could not be set up for the requested format.
    #[display("cannot set up codec")]
    Codec,
    /// No format goes by this name.
    #[display("unknown compression format: {_0}")]
    UnknownFormat(#[error(not(source))] String),
    /// The format exists but this build was compiled without it.
    #[display("compression format not built in: {_0}")]
    NotBuilt(#[error(not(source))] String),
    /// Writing the format trailer, or the final flush, failed. The compressed
    /// output is truncated.
    #[display("cannot finish compressed stream")]
    Trailer,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Trailer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_trailer_is_retryable() {
        assert!(ErrorKind::Trailer.is_retryable());
        assert!(!ErrorKind::Codec.is_retryable());
        assert!(!ErrorKind::NotBuilt("xz".to_string()).is_retryable());
    }
}
