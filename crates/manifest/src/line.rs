//! The two line shapes of a manifest.

use crate::error::{ErrorKind, Result};
use derive_more::Display;
use exn::OptionExt;
use sha2::{Digest, Sha256};
use std::fmt;

/// Version written into every new header.
pub const FORMAT_VERSION: u32 = 1;
/// Sentinel that starts the header line.
pub const HEADER_PREFIX: &str = "_header";

/// One covering fragment of the input: `length` bytes of the resource at
/// `url`, starting `offset` bytes in.
#[derive(Debug, Display, Clone, PartialEq, Eq, Hash)]
#[display("{url} {offset} {length}")]
pub struct MatchEntry {
    pub url: String,
    pub offset: u64,
    pub length: u64,
}

impl MatchEntry {
    pub fn new(url: impl Into<String>, offset: u64, length: u64) -> Self {
        Self { url: url.into(), offset, length }
    }

    /// Check the entry would parse back identically.
    pub fn validate(&self) -> Result<()> {
        if self.length == 0 {
            exn::bail!(ErrorKind::InvalidEntry(format!("zero-length fragment of {}", self.url)));
        }
        if self.url.is_empty() || self.url.contains(char::is_whitespace) {
            exn::bail!(ErrorKind::InvalidEntry(format!("URL is empty or contains whitespace: {:?}", self.url)));
        }
        if is_header_line(&self.url) {
            exn::bail!(ErrorKind::InvalidEntry(format!("URL collides with the header sentinel: {}", self.url)));
        }
        Ok(())
    }

    /// Parse an entry line (without its trailing newline). `None` if the
    /// line is not a well-formed entry.
    pub(crate) fn parse(line: &str) -> Option<Self> {
        let mut fields = line.split(' ');
        let url = fields.next().filter(|url| !url.is_empty())?;
        let offset: u64 = fields.next()?.parse().ok()?;
        let length: u64 = fields.next()?.parse().ok().filter(|&length: &u64| length > 0)?;
        if fields.next().is_some() {
            return None;
        }
        Some(Self::new(url, offset, length))
    }

    /// Exclusive end of the fragment within its resource.
    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.length)
    }
}

/// SHA-256 digest of the input a manifest describes, written as lowercase hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InputHash([u8; 32]);

impl InputHash {
    pub fn of(bytes: &[u8]) -> Self {
        Self(Sha256::digest(bytes).into())
    }

    /// Parse exactly 64 hex digits.
    pub fn from_hex(text: &str) -> Option<Self> {
        let mut bytes = [0; 32];
        hex::decode_to_slice(text, &mut bytes).ok()?;
        Some(Self(bytes))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<Sha256> for InputHash {
    fn from(hasher: Sha256) -> Self {
        Self(hasher.finalize().into())
    }
}

impl fmt::Display for InputHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// The trailing integrity header: format version plus the digest and byte
/// length of the input the manifest describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: u32,
    pub hash: InputHash,
    pub length: u64,
}

impl Header {
    /// A header in the current format version.
    pub fn new(hash: InputHash, length: u64) -> Self {
        Self { version: FORMAT_VERSION, hash, length }
    }

    /// Parse a header line (without its trailing newline).
    pub(crate) fn parse(line: &str) -> Result<Self> {
        let corrupt = || ErrorKind::CorruptHeader;
        let rest = line.strip_prefix(HEADER_PREFIX).and_then(|rest| rest.strip_prefix(':')).ok_or_raise(corrupt)?;
        let mut fields = rest.split(':');
        let version: u32 = fields.next().and_then(|v| v.parse().ok()).ok_or_raise(corrupt)?;
        if version != FORMAT_VERSION {
            exn::bail!(ErrorKind::UnsupportedVersion(version));
        }
        let hash = fields.next().and_then(|h| InputHash::from_hex(h)).ok_or_raise(corrupt)?;
        let length: u64 = fields.next().and_then(|l| l.parse().ok()).ok_or_raise(corrupt)?;
        if fields.next().is_some() {
            exn::bail!(corrupt());
        }
        Ok(Self { version, hash, length })
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{HEADER_PREFIX}:{}:{}:{}", self.version, self.hash, self.length)
    }
}

pub(crate) fn is_header_line(line: &str) -> bool {
    line.strip_prefix(HEADER_PREFIX).is_some_and(|rest| rest.starts_with(':'))
}
