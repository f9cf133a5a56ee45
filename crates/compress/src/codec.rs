//! Streaming encoders and decoders.

use crate::Compression;
use crate::error::{ErrorKind, Result};
use bzip2::{Compression as BzCompression, read::BzDecoder, write::BzEncoder};
use exn::ResultExt;
use flate2::{Compression as GzCompression, read::GzDecoder, write::GzEncoder};
use std::io::{self, Read, Write};
#[cfg(feature = "xz")]
use xz2::{read::XzDecoder, write::XzEncoder};
#[cfg(feature = "zstd")]
use zstd::stream::{read::Decoder as ZstdDecoder, write::Encoder as ZstdEncoder};

// Manifests are written once and read rarely; spend the CPU on size.
const BZIP2_LEVEL: BzCompression = BzCompression::best();
const GZIP_LEVEL: GzCompression = GzCompression::best();
#[cfg(feature = "xz")]
const XZ_LEVEL: u32 = 9;
#[cfg(feature = "zstd")]
const ZSTD_LEVEL: i32 = 19;

/// A compressing [`Write`]r that must be [finished](Self::finish).
///
/// Unlike a boxed `dyn Write`, finishing hands the inner writer back and
/// reports any error from writing the format trailer.
pub enum Encoder<W: Write> {
    Plain(W),
    Bzip2(BzEncoder<W>),
    Gzip(GzEncoder<W>),
    #[cfg(feature = "xz")]
    Xz(XzEncoder<W>),
    #[cfg(feature = "zstd")]
    Zstd(ZstdEncoder<'static, W>),
}

impl<W: Write> Encoder<W> {
    /// Write the format trailer (if any), flush, and return the inner writer.
    pub fn finish(self) -> Result<W> {
        let mut inner = match self {
            Encoder::Plain(w) => w,
            Encoder::Bzip2(e) => e.finish().or_raise(|| ErrorKind::Trailer)?,
            Encoder::Gzip(e) => e.finish().or_raise(|| ErrorKind::Trailer)?,
            #[cfg(feature = "xz")]
            Encoder::Xz(e) => e.finish().or_raise(|| ErrorKind::Trailer)?,
            #[cfg(feature = "zstd")]
            Encoder::Zstd(e) => e.finish().or_raise(|| ErrorKind::Trailer)?,
        };
        inner.flush().or_raise(|| ErrorKind::Trailer)?;
        Ok(inner)
    }
}

impl<W: Write> Write for Encoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Encoder::Plain(w) => w.write(buf),
            Encoder::Bzip2(e) => e.write(buf),
            Encoder::Gzip(e) => e.write(buf),
            #[cfg(feature = "xz")]
            Encoder::Xz(e) => e.write(buf),
            #[cfg(feature = "zstd")]
            Encoder::Zstd(e) => e.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Encoder::Plain(w) => w.flush(),
            Encoder::Bzip2(e) => e.flush(),
            Encoder::Gzip(e) => e.flush(),
            #[cfg(feature = "xz")]
            Encoder::Xz(e) => e.flush(),
            #[cfg(feature = "zstd")]
            Encoder::Zstd(e) => e.flush(),
        }
    }
}

impl Compression {
    /// Wrap a writer with the compression layer for this format.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::io::Write;
    /// use opacify_compress::Compression;
    ///
    /// let mut encoder = Compression::Gzip.writer(Vec::new()).unwrap();
    /// encoder.write_all(b"https://example.com/a 1 4\n").unwrap();
    /// let compressed = encoder.finish().unwrap();
    /// assert_eq!(Compression::from_magic_bytes(&compressed), Compression::Gzip);
    /// ```
    pub fn writer<W: Write>(&self, writer: W) -> Result<Encoder<W>> {
        Ok(match self {
            Compression::None => Encoder::Plain(writer),
            Compression::Bzip2 => Encoder::Bzip2(BzEncoder::new(writer, BZIP2_LEVEL)),
            Compression::Gzip => Encoder::Gzip(GzEncoder::new(writer, GZIP_LEVEL)),
            #[cfg(feature = "xz")]
            Compression::Xz => Encoder::Xz(XzEncoder::new(writer, XZ_LEVEL)),
            #[cfg(feature = "zstd")]
            Compression::Zstd => Encoder::Zstd(ZstdEncoder::new(writer, ZSTD_LEVEL).or_raise(|| ErrorKind::Codec)?),
        })
    }

    /// Wrap a reader with the decompression layer for this format.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::io::{Cursor, Read, Write};
    /// use opacify_compress::Compression;
    ///
    /// let mut encoder = Compression::Bzip2.writer(Vec::new()).unwrap();
    /// encoder.write_all(b"hello").unwrap();
    /// let compressed = encoder.finish().unwrap();
    ///
    /// let mut reader = Compression::Bzip2.reader(Cursor::new(compressed)).unwrap();
    /// let mut plain = String::new();
    /// reader.read_to_string(&mut plain).unwrap();
    /// assert_eq!(plain, "hello");
    /// ```
    pub fn reader<'a, R: Read + 'a>(&self, reader: R) -> Result<Box<dyn Read + 'a>> {
        Ok(match self {
            Compression::None => Box::new(reader),
            Compression::Bzip2 => Box::new(BzDecoder::new(reader)),
            Compression::Gzip => Box::new(GzDecoder::new(reader)),
            #[cfg(feature = "xz")]
            Compression::Xz => Box::new(XzDecoder::new(reader)),
            #[cfg(feature = "zstd")]
            Compression::Zstd => Box::new(ZstdDecoder::new(reader).or_raise(|| ErrorKind::Codec)?),
        })
    }
}
