//! Optional compression for manifests.
//!
//! Manifests are plain newline-delimited text, but large inputs produce large
//! manifests and they compress extremely well (the same handful of URLs repeat
//! on every line). This crate wraps the supported formats behind a single
//! [`Compression`] enum:
//!
//! - **Detection** from a path extension ([`Compression::from_path`]) for
//!   writers, and from magic bytes ([`Compression::from_magic_bytes`]) for
//!   readers, so a manifest renamed after the fact still opens.
//! - **Streaming** decoders ([`Compression::reader`]) and encoders
//!   ([`Compression::writer`]). Encoders must be [finished](Encoder::finish)
//!   explicitly; dropping one silently swallows trailer write errors.
//!
//! Bzip2 and Gzip are always available. XZ and Zstd are behind feature flags.

mod codec;
mod detect;
pub mod error;

pub use crate::codec::Encoder;
pub use crate::detect::MAGIC_LEN;

/// A supported manifest compression format.
///
/// Defaults to [`None`](Self::None) (plain text).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Compression {
    /// Plain text.
    #[default]
    None,
    Bzip2,
    Gzip,
    #[cfg(feature = "xz")]
    Xz,
    #[cfg(feature = "zstd")]
    Zstd,
}

impl Compression {
    /// Returns the file extension (including the dot) for this format.
    #[inline]
    #[must_use]
    pub fn extension(&self) -> &'static str {
        match self {
            Self::None => "",
            Self::Bzip2 => ".bz2",
            Self::Gzip => ".gz",
            #[cfg(feature = "xz")]
            Self::Xz => ".xz",
            #[cfg(feature = "zstd")]
            Self::Zstd => ".zst",
        }
    }

    /// Returns the short name used in configuration.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Bzip2 => "bzip2",
            Self::Gzip => "gzip",
            #[cfg(feature = "xz")]
            Self::Xz => "xz",
            #[cfg(feature = "zstd")]
            Self::Zstd => "zstd",
        }
    }

    /// Whether the format allows seeking in decoded space (only plain text does).
    #[inline]
    #[must_use]
    pub fn is_seekable(&self) -> bool {
        matches!(self, Compression::None)
    }
}

impl std::fmt::Display for Compression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
