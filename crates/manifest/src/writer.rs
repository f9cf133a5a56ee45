use crate::error::{ErrorKind, Result};
use crate::line::{Header, MatchEntry};
use exn::ResultExt;
use opacify_compress::{Compression, Encoder};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Streams entries, then exactly one header, into a (possibly compressed)
/// writer.
///
/// The header is written by [`write_header`](Self::write_header), which
/// consumes the writer: nothing can follow the header, and a manifest whose
/// writer was dropped early has no header and will not read back.
pub struct ManifestWriter<W: Write> {
    encoder: Encoder<W>,
    entries: u64,
    covered: u64,
}

impl<W: Write> ManifestWriter<W> {
    pub fn new(writer: W, compression: Compression) -> Result<Self> {
        let encoder = compression.writer(writer).map_err(ErrorKind::compression)?;
        Ok(Self { encoder, entries: 0, covered: 0 })
    }

    /// Append one entry line. Entries that would not parse back (zero
    /// length, whitespace in the URL) are refused.
    pub fn write_entry(&mut self, entry: &MatchEntry) -> Result<()> {
        entry.validate()?;
        writeln!(self.encoder, "{entry}").or_raise(|| ErrorKind::Write)?;
        self.entries += 1;
        self.covered += entry.length;
        Ok(())
    }

    /// Append the header line, finish the compression stream and hand back
    /// the inner writer.
    pub fn write_header(mut self, header: &Header) -> Result<W> {
        writeln!(self.encoder, "{header}").or_raise(|| ErrorKind::Write)?;
        tracing::trace!(entries = self.entries, covered = self.covered, length = header.length, "Manifest header written");
        self.encoder.finish().map_err(ErrorKind::compression)
    }

    /// Number of entries written so far.
    pub fn entries(&self) -> u64 {
        self.entries
    }

    /// Sum of the lengths of the entries written so far.
    pub fn covered(&self) -> u64 {
        self.covered
    }
}

/// Create (truncating) a manifest file at `path`.
///
/// Without an explicit `compression` the format is inferred from the path
/// extension, so `out.manifest.gz` is gzip and `out.manifest` plain text.
pub fn create(path: impl AsRef<Path>, compression: Option<Compression>) -> Result<ManifestWriter<BufWriter<File>>> {
    let path = path.as_ref();
    let compression = compression.unwrap_or_else(|| Compression::from_path(path));
    let file = File::create(path).or_raise(|| ErrorKind::Io(path.to_path_buf()))?;
    ManifestWriter::new(BufWriter::new(file), compression)
}
