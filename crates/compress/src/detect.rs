use crate::Compression;
use crate::error::{Error, ErrorKind};
use std::path::Path;
use std::str::FromStr;

/// Leading bytes of each compressed format. Plain manifests start with a URL
/// or the header prefix, neither of which collides with these.
const SIGNATURES: &[(&[u8], Compression)] = &[
    (b"BZh", Compression::Bzip2),
    (&[0x1F, 0x8B], Compression::Gzip),
    #[cfg(feature = "xz")]
    (&[0xFD, b'7', b'z', b'X', b'Z', 0x00], Compression::Xz),
    #[cfg(feature = "zstd")]
    (&[0x28, 0xB5, 0x2F, 0xFD], Compression::Zstd),
];

/// Longest signature of any format; read this many bytes before calling
/// [`Compression::from_magic_bytes`].
pub const MAGIC_LEN: usize = 6;

/// Outcome of looking a format up by name or extension.
enum Lookup {
    Found(Compression),
    /// Known format, compiled out of this build.
    NotBuilt,
    Unknown,
}

fn lookup(name: &str) -> Lookup {
    match name.to_ascii_lowercase().as_str() {
        "none" | "plain" => Lookup::Found(Compression::None),
        "bz2" | "bzip2" => Lookup::Found(Compression::Bzip2),
        "gz" | "gzip" => Lookup::Found(Compression::Gzip),
        #[cfg(feature = "xz")]
        "xz" | "lzma" => Lookup::Found(Compression::Xz),
        #[cfg(feature = "zstd")]
        "zst" | "zstd" => Lookup::Found(Compression::Zstd),
        #[cfg(not(feature = "xz"))]
        "xz" | "lzma" => Lookup::NotBuilt,
        #[cfg(not(feature = "zstd"))]
        "zst" | "zstd" => Lookup::NotBuilt,
        _ => Lookup::Unknown,
    }
}

impl FromStr for Compression {
    type Err = Error;

    /// Parse a configured format name (`gzip`) or its extension (`gz`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match lookup(s) {
            Lookup::Found(format) => Ok(format),
            Lookup::NotBuilt => exn::bail!(ErrorKind::NotBuilt(s.to_string())),
            Lookup::Unknown => exn::bail!(ErrorKind::UnknownFormat(s.to_string())),
        }
    }
}

impl Compression {
    /// Format implied by the last extension of `path`, so that writing
    /// `out.manifest.gz` produces gzip. Anything unrecognised is plain text;
    /// an extension naming a format that is not built in is too.
    #[must_use]
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let extension = path.as_ref().extension().and_then(|ext| ext.to_str());
        match extension.map(lookup) {
            // "none"/"plain" are names, not extensions.
            Some(Lookup::Found(format)) if !format.extension().is_empty() => format,
            _ => Compression::None,
        }
    }

    /// Format identified by the leading bytes of a file. Readers rely on this
    /// alone, so a renamed manifest still decodes.
    #[must_use]
    pub fn from_magic_bytes(bytes: &[u8]) -> Self {
        SIGNATURES
            .iter()
            .find(|(signature, _)| bytes.starts_with(signature))
            .map_or(Compression::None, |&(_, format)| format)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for Compression {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(|err: Error| serde::de::Error::custom(&*err))
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Compression {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}
