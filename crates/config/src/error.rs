//! Configuration Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A configuration error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for configuration operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// An explicitly requested configuration file does not exist.
    #[display("configuration file not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// The configuration file extension is not one of TOML, YAML or JSON.
    #[display("unsupported configuration format: {}", _0.display())]
    UnsupportedFormat(#[error(not(source))] PathBuf),
    /// A layer could not be parsed, or a value has the wrong type.
    #[display("invalid configuration: {_0}")]
    Parse(#[error(not(source))] String),
    /// Values parsed but do not make sense together.
    #[display("invalid setting: {_0}")]
    Invalid(#[error(not(source))] String),
}

impl ErrorKind {
    /// Configuration errors never go away on their own.
    pub fn is_retryable(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_display() {
        let kind = ErrorKind::Invalid("matching.chunk_size must be at least 1".to_string());
        assert_eq!(kind.to_string(), "invalid setting: matching.chunk_size must be at least 1");
        assert!(!kind.is_retryable());
    }
}
