//! Split an input across workers and merge what they produce.
//!
//! With one worker (or an input too small to be worth splitting) the engine
//! writes the final manifest directly. Otherwise the input is cut into equal
//! contiguous ranges, each worker writes a shard manifest for its range, and
//! the shards are concatenated in range order. Workers share nothing but the
//! cache directory; each returns one [`RangeReport`] through its join handle.

use crate::context::RunContext;
use crate::digest::digest_file_blocking;
use crate::error::{ErrorKind, Result};
use crate::cover;
use crate::sink::ManifestSink;
use crate::tuning::Tuning;
use exn::ResultExt;
use opacify_cache::ResourceCache;
use opacify_manifest::{Compression, Header, InputHash, ManifestWriter};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::BufWriter;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;
use tracing::instrument;

/// How to run [`pacify`].
#[derive(Debug, Clone, Default)]
pub struct PacifyOptions {
    /// Number of parallel workers; `None` means one.
    pub workers: Option<usize>,
    /// Replace an existing manifest.
    pub overwrite: bool,
    /// Manifest compression; `None` infers it from the manifest extension.
    pub compression: Option<Compression>,
    pub tuning: Tuning,
}

/// What a successful [`pacify`] produced.
#[derive(Debug, Clone)]
pub struct PacifyReport {
    pub manifest: PathBuf,
    /// Size of the manifest file on disk.
    pub manifest_size: u64,
    pub hash: InputHash,
    pub length: u64,
    pub entries: u64,
    pub workers: usize,
    /// Candidates that could not be fetched by at least one worker.
    pub unavailable: BTreeSet<String>,
    pub duration: Duration,
}

/// One worker's result.
#[derive(Debug, Clone)]
pub struct RangeReport {
    pub index: usize,
    pub range: Range<u64>,
    pub hash: InputHash,
    pub length: u64,
    pub entries: u64,
    pub scans: u64,
    pub failed: Vec<String>,
}

/// Everything a worker needs, owned so it can move onto its own task.
struct Job {
    index: usize,
    cache: ResourceCache,
    tuning: Tuning,
    input: PathBuf,
    range: Range<u64>,
    candidates: Arc<[String]>,
    file: File,
    path: PathBuf,
    compression: Compression,
}

/// Encode `input` as a manifest of fragments of the resources in `urls`.
///
/// The manifest is written to a temporary file beside `manifest` and renamed
/// into place only on success, so a failed run never leaves a partial
/// manifest behind (or disturbs an existing one).
#[instrument(skip_all, fields(input = %input.display(), manifest = %manifest.display()))]
pub async fn pacify(
    cache: &ResourceCache,
    input: &Path,
    urls: &[String],
    manifest: &Path,
    options: &PacifyOptions,
) -> Result<PacifyReport> {
    let started = Instant::now();
    if urls.is_empty() {
        exn::bail!(ErrorKind::UrlList("no URLs".to_string()));
    }
    if !options.overwrite && tokio::fs::try_exists(manifest).await.or_raise(|| ErrorKind::Output(manifest.into()))? {
        exn::bail!(ErrorKind::PathConflict(manifest.to_path_buf()));
    }
    let size = tokio::fs::metadata(input).await.or_raise(|| ErrorKind::Input(input.to_path_buf()))?.len();
    let compression = options.compression.unwrap_or_else(|| Compression::from_path(manifest));
    let directory = parent_dir(manifest);
    let candidates: Arc<[String]> = urls.into();

    let requested = options.workers.unwrap_or(1).max(1);
    let single = requested == 1 || (requested as u64).saturating_mul(options.tuning.min_bytes_per_worker) > size;
    let workers = if single { 1 } else { requested };
    tracing::info!(size, workers, candidates = candidates.len(), "Pacifying");

    let partial = temp_file(&directory, ".opacify-", ".manifest.partial")?;
    let (reports, written) = if single {
        let job = Job {
            index: 0,
            cache: cache.clone(),
            tuning: options.tuning.clone(),
            input: input.to_path_buf(),
            range: 0..size,
            candidates,
            file: clone_handle(&partial)?,
            path: partial.path().to_path_buf(),
            compression,
        };
        let report = run_range(job).await?;
        let written = (report.hash, report.length, report.entries);
        (vec![report], written)
    } else {
        let ranges = partition(size, workers);
        let shard_prefix = format!(".{}.shard-", file_name(manifest));
        let shards = (0..workers)
            .map(|index| temp_file(&directory, &format!("{shard_prefix}{index}-"), ""))
            .collect::<Result<Vec<_>>>()?;

        let mut handles = Vec::with_capacity(workers);
        for (index, (range, shard)) in ranges.into_iter().zip(&shards).enumerate() {
            let job = Job {
                index,
                cache: cache.clone(),
                tuning: options.tuning.clone(),
                input: input.to_path_buf(),
                range,
                candidates: candidates.clone(),
                file: clone_handle(shard)?,
                path: shard.path().to_path_buf(),
                compression: Compression::None,
            };
            handles.push(tokio::spawn(run_range(job)));
        }
        // Every worker runs to completion before the first error (in range
        // order, not completion order) is reported.
        let joined = futures::future::join_all(handles).await;
        let mut reports = Vec::with_capacity(workers);
        for (index, result) in joined.into_iter().enumerate() {
            reports.push(result.or_raise(|| ErrorKind::Worker(index))??);
        }

        let shard_paths: Vec<_> = shards.iter().map(|shard| shard.path().to_path_buf()).collect();
        let merge_reports = reports.clone();
        let merge_input = input.to_path_buf();
        let out = clone_handle(&partial)?;
        let out_path = partial.path().to_path_buf();
        let written = tokio::task::spawn_blocking(move || {
            merge(&merge_input, &shard_paths, &merge_reports, out, &out_path, compression)
        })
        .await
        .or_raise(|| ErrorKind::Worker(workers))??;

        for shard in shards {
            let path = shard.path().to_path_buf();
            shard.close().or_raise(|| ErrorKind::Output(path))?;
        }
        (reports, written)
    };

    let (hash, length, entries) = written;
    partial.persist(manifest).or_raise(|| ErrorKind::Output(manifest.to_path_buf()))?;
    let manifest_size = tokio::fs::metadata(manifest).await.or_raise(|| ErrorKind::Output(manifest.into()))?.len();
    let unavailable = reports.into_iter().flat_map(|report| report.failed).collect();
    tracing::info!(entries, length, manifest_size, "Manifest written");
    Ok(PacifyReport {
        manifest: manifest.to_path_buf(),
        manifest_size,
        hash,
        length,
        entries,
        workers,
        unavailable,
        duration: started.elapsed(),
    })
}

/// One worker: run the engine over its range into its own manifest file.
#[instrument(level = "debug", skip_all, fields(worker = job.index))]
async fn run_range(job: Job) -> Result<RangeReport> {
    let Job { index, cache, tuning, input, range, candidates, file, path, compression } = job;
    let sink = ManifestSink::spawn(file, path, compression);
    let mut ctx = RunContext::new(cache, tuning);

    if let Err(err) = cover::run(&mut ctx, &input, range.clone(), &candidates, &sink).await {
        // If the writer died first, its error explains the failed send.
        sink.abandon().await?;
        return Err(err);
    }
    let (hash, length) = ctx.finalize();
    let written = sink.finish(Header::new(hash, length)).await?;
    if written.covered != length {
        exn::bail!(ErrorKind::LengthMismatch { expected: length, actual: written.covered });
    }
    let mut failed: Vec<_> = ctx.failed.into_iter().collect();
    failed.sort();
    tracing::debug!(entries = written.entries, scans = ctx.scans, failed = failed.len(), "Range covered");
    Ok(RangeReport { index, range, hash, length, entries: written.entries, scans: ctx.scans, failed })
}

/// Concatenate shard entries in range order into `out`, then write a header
/// computed from the input itself rather than from the shards.
fn merge(
    input: &Path,
    shards: &[PathBuf],
    reports: &[RangeReport],
    out: File,
    out_path: &Path,
    compression: Compression,
) -> Result<(InputHash, u64, u64)> {
    let mut writer = ManifestWriter::new(BufWriter::new(out), compression).map_err(ErrorKind::manifest)?;
    for (shard, report) in shards.iter().zip(reports) {
        let mut entries = opacify_manifest::entries(shard).map_err(ErrorKind::manifest)?;
        let mut covered = 0;
        for entry in entries.by_ref() {
            let entry = entry.map_err(ErrorKind::manifest)?;
            covered += entry.length;
            writer.write_entry(&entry).map_err(ErrorKind::manifest)?;
        }
        let expected = report.range.end - report.range.start;
        let declared = entries.header().map(|header| header.length);
        if declared != Some(expected) || covered != expected {
            exn::bail!(ErrorKind::LengthMismatch { expected, actual: covered });
        }
    }

    let (hash, length) = digest_file_blocking(input)?;
    if writer.covered() != length {
        exn::bail!(ErrorKind::LengthMismatch { expected: length, actual: writer.covered() });
    }
    let entries = writer.entries();
    let file = writer.write_header(&Header::new(hash, length)).map_err(ErrorKind::manifest)?;
    file.get_ref().sync_all().or_raise(|| ErrorKind::Output(out_path.to_path_buf()))?;
    Ok((hash, length, entries))
}

/// Split `[0, size)` into `workers` contiguous ranges of equal length, the
/// last one also taking the remainder.
pub(crate) fn partition(size: u64, workers: usize) -> Vec<Range<u64>> {
    let workers = workers.max(1) as u64;
    let base = size / workers;
    (0..workers).map(|i| i * base..if i + 1 == workers { size } else { (i + 1) * base }).collect()
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn file_name(path: &Path) -> String {
    path.file_name().map(|name| name.to_string_lossy().into_owned()).unwrap_or_else(|| "manifest".to_string())
}

/// Temporary file beside the destination, so the final rename stays on one
/// filesystem. Deleted on drop unless persisted.
fn temp_file(directory: &Path, prefix: &str, suffix: &str) -> Result<NamedTempFile> {
    tempfile::Builder::new()
        .prefix(prefix)
        .suffix(suffix)
        .tempfile_in(directory)
        .or_raise(|| ErrorKind::Output(directory.to_path_buf()))
}

fn clone_handle(temp: &NamedTempFile) -> Result<File> {
    temp.as_file().try_clone().or_raise(|| ErrorKind::Output(temp.path().to_path_buf()))
}
