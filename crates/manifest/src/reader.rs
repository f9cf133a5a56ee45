use crate::error::{ErrorKind, Result};
use crate::line::{Header, MatchEntry, is_header_line};
use exn::{OptionExt, ResultExt};
use opacify_compress::{Compression, MAGIC_LEN};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::instrument;

/// Initial size of the tail read that looks for the header line; doubled
/// until the whole line fits.
const TAIL_WINDOW: u64 = 256;

/// Open a manifest and sniff its compression from the leading magic bytes.
/// The returned file is rewound to the start.
fn open(path: &Path) -> Result<(Compression, File)> {
    let io = || ErrorKind::Io(path.to_path_buf());
    let mut file = File::open(path).or_raise(io)?;
    let mut magic = Vec::with_capacity(MAGIC_LEN);
    (&mut file).take(MAGIC_LEN as u64).read_to_end(&mut magic).or_raise(io)?;
    file.rewind().or_raise(io)?;
    Ok((Compression::from_magic_bytes(&magic), file))
}

/// Read the trailing header of a manifest without parsing any entry.
///
/// Plain-text manifests are read from the end: a small window at the tail
/// is searched for the last line, and the window grows only if the line is
/// longer than it. Compressed manifests cannot seek in decoded space and are
/// decoded as a stream, keeping nothing but the most recent line.
#[instrument(level = "debug", skip_all, fields(path = %path.as_ref().display()))]
pub fn read_header(path: impl AsRef<Path>) -> Result<Header> {
    let path = path.as_ref();
    let (compression, file) = open(path)?;
    let header = if compression.is_seekable() {
        tail_header(file, path)?
    } else {
        let reader = compression.reader(file).map_err(ErrorKind::compression)?;
        streamed_header(BufReader::new(reader), path)?
    };
    tracing::debug!(%compression, length = header.length, "Manifest header read");
    Ok(header)
}

fn tail_header(mut file: File, path: &Path) -> Result<Header> {
    let io = || ErrorKind::Io(path.to_path_buf());
    let size = file.metadata().or_raise(io)?.len();
    let mut window = TAIL_WINDOW.min(size);
    loop {
        file.seek(SeekFrom::Start(size - window)).or_raise(io)?;
        let mut tail = vec![0; usize::try_from(window).or_raise(io)?];
        file.read_exact(&mut tail).or_raise(io)?;
        let body = tail.strip_suffix(b"\n").unwrap_or(&tail);
        match memchr::memrchr(b'\n', body) {
            Some(newline) => return parse_last_line(&body[newline + 1..]),
            // The whole file is one line (a manifest for empty input).
            None if window == size => return parse_last_line(body),
            None => window = window.saturating_mul(2).min(size),
        }
    }
}

fn streamed_header<R: BufRead>(mut reader: R, path: &Path) -> Result<Header> {
    let mut last = Vec::new();
    let mut current = Vec::new();
    loop {
        current.clear();
        let read = match reader.read_until(b'\n', &mut current) {
            Ok(read) => read,
            Err(e) => {
                let kind = read_failure(&e, true, path, 0);
                return Err(e).or_raise(|| kind);
            },
        };
        if read == 0 {
            break;
        }
        std::mem::swap(&mut last, &mut current);
    }
    parse_last_line(last.strip_suffix(b"\n").unwrap_or(&last))
}

/// Classify a failed read. Decoders report damaged or truncated input as
/// I/O errors; on a compressed stream those mean corrupt content.
fn read_failure(err: &io::Error, compressed: bool, path: &Path, line: u64) -> ErrorKind {
    use io::ErrorKind::{InvalidData, InvalidInput, Other, UnexpectedEof};
    match err.kind() {
        UnexpectedEof | InvalidData | InvalidInput | Other if compressed => ErrorKind::DamagedStream,
        // Not UTF-8.
        InvalidData => ErrorKind::CorruptEntry { line },
        _ => ErrorKind::Io(path.to_path_buf()),
    }
}

fn parse_last_line(line: &[u8]) -> Result<Header> {
    let line = std::str::from_utf8(line).or_raise(|| ErrorKind::CorruptHeader)?;
    if !is_header_line(line) {
        exn::bail!(ErrorKind::MissingHeader);
    }
    Header::parse(line)
}

/// Lazily iterate the entries of a manifest, in order.
///
/// Iteration stops at the header line, which is then available from
/// [`Entries::header`]. A manifest that ends without a header, or that has
/// anything after it, yields an error as its last item.
pub fn entries(path: impl AsRef<Path>) -> Result<Entries> {
    let path = path.as_ref();
    let (compression, file) = open(path)?;
    let reader = compression.reader(file).map_err(ErrorKind::compression)?;
    Ok(Entries {
        reader: BufReader::new(reader),
        compressed: compression != Compression::None,
        path: path.to_path_buf(),
        line: 0,
        buffer: String::new(),
        header: None,
        finished: false,
    })
}

pub struct Entries {
    reader: BufReader<Box<dyn Read>>,
    compressed: bool,
    path: PathBuf,
    line: u64,
    buffer: String,
    header: Option<Header>,
    finished: bool,
}

impl Entries {
    /// The header, once iteration has reached it.
    pub fn header(&self) -> Option<&Header> {
        self.header.as_ref()
    }

    fn read_line(&mut self) -> Result<Option<&str>> {
        self.buffer.clear();
        let read = match self.reader.read_line(&mut self.buffer) {
            Ok(read) => read,
            Err(e) => {
                let kind = read_failure(&e, self.compressed, &self.path, self.line + 1);
                return Err(e).or_raise(|| kind);
            },
        };
        if read == 0 {
            return Ok(None);
        }
        self.line += 1;
        Ok(Some(self.buffer.strip_suffix('\n').unwrap_or(&self.buffer)))
    }

    fn next_entry(&mut self) -> Result<Option<MatchEntry>> {
        let line_number = self.line + 1;
        let line = self.read_line()?.ok_or_raise(|| ErrorKind::MissingHeader)?;
        if is_header_line(line) {
            let header = Header::parse(line)?;
            if self.read_line()?.is_some() {
                exn::bail!(ErrorKind::CorruptEntry { line: self.line });
            }
            self.header = Some(header);
            return Ok(None);
        }
        MatchEntry::parse(line).map(Some).ok_or_raise(|| ErrorKind::CorruptEntry { line: line_number })
    }
}

impl Iterator for Entries {
    type Item = Result<MatchEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.next_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.finished = true;
                None
            },
            Err(err) => {
                self.finished = true;
                Some(Err(err))
            },
        }
    }
}
