//! The manifest: everything needed to rebuild an input from resources.
//!
//! A manifest is newline-delimited text. Each line but the last is one
//! [`MatchEntry`], `"<url> <offset> <length>"`, in input byte order. The last
//! line is the [`Header`], `"_header:<version>:<sha256 hex>:<length>"`,
//! describing the whole input. Putting the header last lets a writer stream
//! entries without knowing the final digest, and [`read_header`] recovers it
//! from the tail without touching any entry.
//!
//! Manifests may be compressed (see `opacify-compress`). Writers pick the
//! format from the path extension, readers from the magic bytes.

pub mod error;
mod line;
mod reader;
mod writer;

pub use crate::line::{FORMAT_VERSION, HEADER_PREFIX, Header, InputHash, MatchEntry};
pub use crate::reader::{Entries, entries, read_header};
pub use crate::writer::{ManifestWriter, create};
pub use opacify_compress::Compression;
