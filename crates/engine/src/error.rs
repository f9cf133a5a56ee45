//! Engine Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction. Errors from the cache and manifest crates are raised
//! into one of these kinds, keeping the original frame as a child.

use derive_more::{Display, Error};
use opacify_cache::error::{Error as CacheError, ErrorKind as CacheErrorKind};
use opacify_manifest::error::Error as ManifestError;
use std::path::PathBuf;

/// An engine error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// ### Caller Errors
/// - [`ErrorKind::PathConflict`]
/// - [`ErrorKind::UrlList`]
///
/// ### Content Errors
/// - [`ErrorKind::NoMatchFound`]
/// - [`ErrorKind::ManifestCorrupt`]
/// - [`ErrorKind::HashMismatch`] and [`ErrorKind::LengthMismatch`], together
///   the integrity check of a rebuilt file.
///
/// ### Dependency Errors
/// - [`ErrorKind::ResourceUnavailable`], [`ErrorKind::ShortRead`] and
///   [`ErrorKind::Cache`] from the resource cache.
/// - [`ErrorKind::Manifest`] for manifest I/O that is not corruption.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The destination exists and overwriting was not requested.
    #[display("refusing to overwrite existing file: {}", _0.display())]
    PathConflict(#[error(not(source))] PathBuf),
    /// A resource could not be fetched.
    #[display("resource unavailable: {_0}")]
    ResourceUnavailable(#[error(not(source))] String),
    /// No candidate resource contains even one byte of the input at `offset`.
    #[display("no resource contains the input at offset {offset}")]
    NoMatchFound { offset: u64 },
    /// A manifest or manifest shard failed to parse.
    #[display("manifest is corrupt")]
    ManifestCorrupt,
    /// Manifest I/O failed for a reason other than its content.
    #[display("manifest I/O failed")]
    Manifest,
    /// The rebuilt output does not hash to the manifest's digest.
    #[display("hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },
    /// The rebuilt output (or the entries of a manifest) does not have the
    /// manifest's declared length.
    #[display("length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch { expected: u64, actual: u64 },
    /// A resource is smaller than a manifest entry needs.
    #[display("resource too short: {_0}")]
    ShortRead(#[error(not(source))] String),
    /// The resource cache failed locally.
    #[display("resource cache failure")]
    Cache,
    /// The input file could not be read.
    #[display("cannot read input: {}", _0.display())]
    Input(#[error(not(source))] PathBuf),
    /// The output (manifest, shard or rebuilt file) could not be written.
    #[display("cannot write output: {}", _0.display())]
    Output(#[error(not(source))] PathBuf),
    /// The URL list is unusable.
    #[display("invalid URL list: {_0}")]
    UrlList(#[error(not(source))] String),
    /// A worker task died without reporting a result.
    #[display("worker {_0} did not complete")]
    Worker(#[error(not(source))] usize),
}

impl ErrorKind {
    /// Stable diagnostic code, printed next to the message.
    pub fn code(&self) -> &'static str {
        match self {
            Self::PathConflict(_) => "E_PATH_CONFLICT",
            Self::ResourceUnavailable(_) => "E_RESOURCE_UNAVAILABLE",
            Self::NoMatchFound { .. } => "E_NO_MATCH",
            Self::ManifestCorrupt => "E_MANIFEST_CORRUPT",
            Self::Manifest => "E_MANIFEST",
            Self::HashMismatch { .. } => "E_HASH_MISMATCH",
            Self::LengthMismatch { .. } => "E_LENGTH_MISMATCH",
            Self::ShortRead(_) => "E_SHORT_READ",
            Self::Cache => "E_CACHE",
            Self::Input(_) => "E_INPUT",
            Self::Output(_) => "E_OUTPUT",
            Self::UrlList(_) => "E_URL_LIST",
            Self::Worker(_) => "E_WORKER",
        }
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ResourceUnavailable(_) | Self::Cache | Self::Worker(_))
    }

    /// Returns `true` for the two halves of an integrity failure.
    pub fn is_integrity(&self) -> bool {
        matches!(self, Self::HashMismatch { .. } | Self::LengthMismatch { .. })
    }

    /// Raise a cache error into the engine taxonomy, keeping the cache frame
    /// as a child.
    #[track_caller]
    pub fn cache(err: CacheError) -> Error {
        let kind = match &*err {
            CacheErrorKind::FetchFailed { url, .. } => Self::ResourceUnavailable(url.clone()),
            CacheErrorKind::ShortRead { url, .. } => Self::ShortRead(url.clone()),
            _ => Self::Cache,
        };
        err.raise(kind)
    }

    /// Raise a manifest error into the engine taxonomy, keeping the manifest
    /// frame as a child.
    #[track_caller]
    pub fn manifest(err: ManifestError) -> Error {
        let kind = if err.is_corrupt() { Self::ManifestCorrupt } else { Self::Manifest };
        err.raise(kind)
    }
}
