//! Rebuild an input from its manifest.

use crate::digest::digest_file;
use crate::error::{ErrorKind, Result};
use async_stream::stream;
use exn::ResultExt;
use futures::{Stream, StreamExt};
use opacify_cache::ResourceCache;
use opacify_manifest::{Header, InputHash, MatchEntry};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tracing::instrument;

const ENTRY_BUFFER: usize = 256;

/// What a successful [`satisfy`] produced.
#[derive(Debug, Clone)]
pub struct SatisfyReport {
    pub output: PathBuf,
    pub manifest_size: u64,
    pub hash: InputHash,
    pub length: u64,
    pub entries: u64,
    pub duration: Duration,
}

/// Read the header of `manifest` on a blocking thread.
pub(crate) async fn load_header(manifest: &Path) -> Result<Header> {
    let path = manifest.to_path_buf();
    tokio::task::spawn_blocking(move || opacify_manifest::read_header(&path))
        .await
        .or_raise(|| ErrorKind::Manifest)?
        .map_err(ErrorKind::manifest)
}

/// Entries of `manifest` in order, parsed on a blocking thread.
///
/// The stream ends after the last entry, or after the first error.
pub(crate) fn entry_stream(manifest: PathBuf) -> impl Stream<Item = Result<MatchEntry>> {
    let (sender, mut receiver) = mpsc::channel(ENTRY_BUFFER);
    let reader = tokio::task::spawn_blocking(move || {
        let entries = match opacify_manifest::entries(&manifest) {
            Ok(entries) => entries,
            Err(err) => {
                let _ = sender.blocking_send(Err(ErrorKind::manifest(err)));
                return;
            },
        };
        for item in entries {
            let failed = item.is_err();
            // The receiver is gone once the consumer stops early.
            if sender.blocking_send(item.map_err(ErrorKind::manifest)).is_err() || failed {
                return;
            }
        }
    });
    stream! {
        while let Some(item) = receiver.recv().await {
            yield item;
        }
        if reader.await.is_err() {
            yield Err(exn::Exn::from(ErrorKind::Manifest));
        }
    }
}

/// Replay `manifest` against the cache into `output`, then check the result
/// against the manifest's header.
///
/// On an integrity failure ([`HashMismatch`](ErrorKind::HashMismatch) or
/// [`LengthMismatch`](ErrorKind::LengthMismatch)) the output is left on disk
/// for inspection.
#[instrument(skip_all, fields(manifest = %manifest.display(), output = %output.display()))]
pub async fn satisfy(cache: &ResourceCache, manifest: &Path, output: &Path, overwrite: bool) -> Result<SatisfyReport> {
    let started = Instant::now();
    let write_error = || ErrorKind::Output(output.to_path_buf());
    if !overwrite && tokio::fs::try_exists(output).await.or_raise(write_error)? {
        exn::bail!(ErrorKind::PathConflict(output.to_path_buf()));
    }
    let header = load_header(manifest).await?;
    let manifest_size = tokio::fs::metadata(manifest).await.or_raise(|| ErrorKind::Manifest)?.len();
    tracing::info!(length = header.length, "Satisfying");

    let mut out = BufWriter::new(File::create(output).await.or_raise(write_error)?);
    let mut entries = std::pin::pin!(entry_stream(manifest.to_path_buf()));
    let step = (header.length / 100).max(1);
    let (mut written, mut count, mut next_report) = (0u64, 0u64, step);
    while let Some(entry) = entries.next().await {
        let entry = entry?;
        let bytes = cache.read_slice(&entry.url, entry.offset, entry.length).await.map_err(ErrorKind::cache)?;
        out.write_all(&bytes).await.or_raise(write_error)?;
        written += entry.length;
        count += 1;
        if written >= next_report {
            tracing::debug!(offset = written, total = header.length, "Satisfy progress");
            next_report = written + step;
        }
    }
    out.flush().await.or_raise(write_error)?;
    out.into_inner().sync_all().await.or_raise(write_error)?;

    // Digest what actually landed on disk, not what we meant to write.
    let (hash, length) = digest_file(output).await.map_err(|err| err.raise(write_error()))?;
    if length != header.length {
        exn::bail!(ErrorKind::LengthMismatch { expected: header.length, actual: length });
    }
    if hash != header.hash {
        exn::bail!(ErrorKind::HashMismatch { expected: header.hash.to_hex(), actual: hash.to_hex() });
    }
    tracing::info!(entries = count, length, "Output verified");
    Ok(SatisfyReport { output: output.to_path_buf(), manifest_size, hash, length, entries: count, duration: started.elapsed() })
}
