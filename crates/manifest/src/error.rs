//! Manifest Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction.

use derive_more::{Display, Error};
use opacify_compress::error::{Error as CompressionError, ErrorKind as CompressionErrorKind};
use std::path::PathBuf;

/// A manifest error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for manifest operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// An entry line failed to parse (1-based line number).
    #[display("corrupt manifest entry on line {line}")]
    CorruptEntry { line: u64 },
    /// The trailing header line failed to parse.
    #[display("corrupt manifest header")]
    CorruptHeader,
    /// The manifest ended without a header line (truncated or still being written).
    #[display("manifest has no header")]
    MissingHeader,
    /// A compressed manifest failed to decode: damaged or cut short.
    #[display("compressed manifest stream is damaged or truncated")]
    DamagedStream,
    /// The header names a format version this build cannot read.
    #[display("unsupported manifest version {_0}")]
    UnsupportedVersion(#[error(not(source))] u32),
    /// Refused to write an entry that would not parse back.
    #[display("invalid manifest entry: {_0}")]
    InvalidEntry(#[error(not(source))] String),
    /// Compression layer failed.
    #[display("compression error: {_0}")]
    Compression(CompressionErrorKind),
    /// Writing to the manifest stream failed.
    #[display("failed to write manifest")]
    Write,
    /// Local I/O failed.
    #[display("I/O error: {}", _0.display())]
    Io(#[error(not(source))] PathBuf),
}

impl ErrorKind {
    /// Convert a compression error into a manifest error, keeping the
    /// compress crate's frame as a child in the error tree.
    #[track_caller]
    pub fn compression(err: CompressionError) -> Error {
        let inner = (*err).clone();
        err.raise(ErrorKind::Compression(inner))
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Write)
    }

    /// Returns `true` if the manifest content itself is unusable.
    pub fn is_corrupt(&self) -> bool {
        matches!(
            self,
            Self::CorruptEntry { .. }
                | Self::CorruptHeader
                | Self::MissingHeader
                | Self::DamagedStream
                | Self::UnsupportedVersion(_)
        )
    }
}
