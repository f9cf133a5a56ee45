//! Find where a prefix of the input occurs inside some candidate resource.

use crate::context::RunContext;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use memchr::memmem::Finder;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::instrument;

/// A prefix of the needle found inside a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    pub url: String,
    pub offset: u64,
    pub length: usize,
}

/// Greedy search for the longest ladder length of `needle` that some
/// candidate contains.
///
/// For each length on the backoff ladder (longest first), candidates are
/// tried in list order and the first one containing that prefix wins; there
/// is no search for a better match elsewhere. Candidates that fail to fetch
/// are recorded in the context and skipped from then on.
///
/// An occurrence at offset zero of a resource is never accepted. Manifests
/// in the wild were produced under that rule, so it stays.
///
/// Returns `Ok(None)` once the ladder is exhausted without a match.
#[instrument(level = "trace", skip_all, fields(needle = needle.len()))]
pub async fn find(ctx: &mut RunContext, needle: &[u8], candidates: &[String]) -> Result<Option<Match>> {
    for length in ctx.tuning.ladder.lengths(needle.len()) {
        let prefix = &needle[..length];
        for url in candidates {
            if ctx.failed.contains(url) {
                continue;
            }
            let entry = match ctx.cache.ensure(url).await {
                Ok(entry) => entry,
                Err(err) if err.is_unavailable() => {
                    let reason = &*err;
                    tracing::warn!(url, error = %reason, "Skipping unavailable resource for the rest of this run");
                    ctx.failed.insert(url.clone());
                    continue;
                },
                Err(err) => return Err(ErrorKind::cache(err)),
            };
            ctx.scans += 1;
            if let Some(offset) = scan(&entry.path, prefix, ctx.tuning.scan_window).await? {
                return Ok(Some(Match { url: url.clone(), offset, length }));
            }
        }
        tracing::trace!(length, "No candidate contains the needle");
    }
    Ok(None)
}

/// Offset of the first occurrence of `needle` past offset zero in the file at
/// `path`, reading `window` bytes at a time.
///
/// The last `needle.len() - 1` bytes of each window are carried into the
/// next, so an occurrence spanning two reads is still found.
pub(crate) async fn scan(path: &Path, needle: &[u8], window: usize) -> Result<Option<u64>> {
    if needle.is_empty() {
        return Ok(None);
    }
    let io = || ErrorKind::Cache;
    let finder = Finder::new(needle);
    let window = window.max(needle.len());
    let carry = needle.len() - 1;
    let mut file = File::open(path).await.or_raise(io)?;
    let mut buffer: Vec<u8> = Vec::with_capacity(window + carry);
    // Absolute offset of `buffer[0]` within the resource.
    let mut base: u64 = 0;

    loop {
        let kept = buffer.len();
        buffer.resize(kept + window, 0);
        let read = read_full(&mut file, &mut buffer[kept..]).await.or_raise(io)?;
        buffer.truncate(kept + read);
        if read == 0 {
            return Ok(None);
        }
        // Offset zero is only ever at the start of the first window.
        let skip = usize::from(base == 0).min(buffer.len());
        if let Some(position) = finder.find(&buffer[skip..]) {
            return Ok(Some(base + (skip + position) as u64));
        }
        let consumed = buffer.len().saturating_sub(carry);
        buffer.drain(..consumed);
        base += consumed as u64;
    }
}

/// Fill `buffer` unless end of stream comes first; returns the bytes read.
pub(crate) async fn read_full<R: AsyncRead + Unpin>(reader: &mut R, buffer: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        match reader.read(&mut buffer[filled..]).await? {
            0 => break,
            read => filled += read,
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn resource(dir: &tempfile::TempDir, body: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join("r");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[rstest]
    #[case(b"xxabcdxx", b"abcd", 1024, Some(2))]
    #[case(b"abcdxxxx", b"abcd", 1024, None)]
    #[case(b"abcdabcd", b"abcd", 1024, Some(4))]
    #[case(b"aaa", b"aa", 1024, Some(1))]
    #[case(b"a", b"a", 1024, None)]
    #[case(b"", b"a", 1024, None)]
    // Straddles a window boundary: windows of 4 split "abcd" as "xxab"/"cd".
    #[case(b"xxabcdxx", b"abcd", 4, Some(2))]
    #[case(b"0123456789abcdef", b"9abc", 3, Some(9))]
    #[case(b"0123456789abcdef", b"f", 1, Some(15))]
    #[tokio::test]
    async fn test_scan(#[case] body: &[u8], #[case] needle: &[u8], #[case] window: usize, #[case] expected: Option<u64>) {
        let dir = tempfile::tempdir().unwrap();
        let path = resource(&dir, body);
        assert_eq!(scan(&path, needle, window).await.unwrap(), expected);
    }
}
