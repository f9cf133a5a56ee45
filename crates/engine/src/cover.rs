//! Cover one byte range of the input with resource fragments.

use crate::context::RunContext;
use crate::error::{ErrorKind, Result};
use crate::matcher::{self, read_full};
use crate::sink::ManifestSink;
use exn::ResultExt;
use futures::{StreamExt, stream};
use opacify_manifest::MatchEntry;
use std::io::SeekFrom;
use std::ops::Range;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::instrument;

/// Mirror every candidate up front, so matching mostly reads local files.
/// Candidates that fail here are marked failed for the rest of the run.
pub(crate) async fn warm_up(ctx: &mut RunContext, candidates: &[String]) -> Result<()> {
    // Fetches own their URL and cache handle; workers run on spawned tasks.
    let cache = ctx.cache.clone();
    let results: Vec<_> = stream::iter(candidates.iter().cloned())
        .map(move |url| {
            let cache = cache.clone();
            async move {
                let result = cache.ensure(&url).await;
                (url, result)
            }
        })
        .buffer_unordered(ctx.tuning.fetch_concurrency.max(1))
        .collect()
        .await;
    for (url, result) in results {
        match result {
            Ok(_) => {},
            Err(err) if err.is_unavailable() => {
                let reason = &*err;
                tracing::warn!(url, error = %reason, "Resource unavailable during warm-up");
                ctx.failed.insert(url);
            },
            Err(err) => return Err(ErrorKind::cache(err)),
        }
    }
    tracing::debug!(candidates = candidates.len(), failed = ctx.failed.len(), "Cache warmed up");
    Ok(())
}

/// Run the engine over `range` of `input`, sending entries to `sink` in
/// input order. The context's digest ends up covering exactly the range.
///
/// Fails with [`NoMatchFound`](ErrorKind::NoMatchFound) as soon as some byte
/// cannot be covered; whatever was sent to the sink is then useless.
#[instrument(level = "debug", skip_all, fields(start = range.start, end = range.end))]
pub(crate) async fn run(
    ctx: &mut RunContext,
    input: &Path,
    range: Range<u64>,
    candidates: &[String],
    sink: &ManifestSink,
) -> Result<()> {
    warm_up(ctx, candidates).await?;

    let read_error = || ErrorKind::Input(input.to_path_buf());
    let mut file = File::open(input).await.or_raise(read_error)?;
    file.seek(SeekFrom::Start(range.start)).await.or_raise(read_error)?;
    let total = range.end - range.start;
    let mut reader = file.take(total);
    let mut chunk = vec![0; ctx.tuning.chunk_size.max(1)];
    // Progress is reported roughly every percent.
    let step = (total / 100).max(chunk.len() as u64);
    let mut next_report = step;

    loop {
        let read = read_full(&mut reader, &mut chunk).await.or_raise(read_error)?;
        if read == 0 {
            break;
        }
        let chunk_start = range.start + ctx.processed;
        ctx.consume(&chunk[..read]);

        let mut remainder = &chunk[..read];
        while !remainder.is_empty() {
            let offset = chunk_start + (read - remainder.len()) as u64;
            let Some(found) = matcher::find(ctx, remainder, candidates).await? else {
                exn::bail!(ErrorKind::NoMatchFound { offset });
            };
            tracing::trace!(offset, url = %found.url, at = found.offset, length = found.length, "Matched");
            remainder = &remainder[found.length..];
            sink.push(MatchEntry::new(found.url, found.offset, found.length as u64)).await?;
        }

        if ctx.processed >= next_report {
            tracing::debug!(offset = range.start + ctx.processed, total = range.end, "Pacify progress");
            next_report += step;
        }
    }

    if ctx.processed != total {
        // The input shrank while we were reading it.
        exn::bail!(ErrorKind::LengthMismatch { expected: total, actual: ctx.processed });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuning::Tuning;
    use opacify_cache::ResourceCache;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_warm_up_on_spawned_task() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResourceCache::new(dir.path(), Duration::from_secs(2)).unwrap();
        let cached = "https://resources.invalid/a.bin".to_string();
        std::fs::write(cache.path_for(&cached), b"xxabcdxx").unwrap();
        let dead = "http://127.0.0.1:9/gone.jpg".to_string();
        let candidates: Arc<[String]> = vec![cached.clone(), dead.clone()].into();

        let ctx = tokio::spawn(async move {
            let mut ctx = RunContext::new(cache, Tuning::default());
            let warmed = warm_up(&mut ctx, &candidates).await;
            warmed.map(|()| ctx)
        })
        .await
        .unwrap()
        .unwrap();
        assert!(ctx.failed().contains(&dead));
        assert!(!ctx.failed().contains(&cached));
    }
}
