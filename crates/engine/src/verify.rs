//! Check a manifest without rebuilding anything.

use crate::error::{ErrorKind, Result};
use crate::satisfy::{entry_stream, load_header};
use futures::StreamExt;
use opacify_cache::ResourceCache;
use opacify_manifest::{Header, MatchEntry};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::instrument;

/// Findings of [`verify`].
#[derive(Debug, Clone)]
pub struct VerifyReport {
    pub header: Header,
    pub entries: u64,
    /// Distinct resources referenced, in URL order.
    pub resources: Vec<String>,
    /// Resources that could not be fetched (only when resolving).
    pub unavailable: Vec<String>,
    /// Entries reaching past the end of their resource, with their 0-based
    /// index in the manifest (only when resolving).
    pub out_of_range: Vec<(u64, MatchEntry)>,
}

impl VerifyReport {
    /// `true` if nothing would stop a rebuild.
    pub fn is_clean(&self) -> bool {
        self.unavailable.is_empty() && self.out_of_range.is_empty()
    }
}

/// Check that `manifest` is well formed and internally consistent: every
/// entry parses, the header is last and readable, and the entry lengths add
/// up to the declared input length.
///
/// With a `resolver`, every referenced resource is also mirrored and each
/// entry checked to lie within its resource. Problems found that way are
/// reported, not raised.
#[instrument(skip_all, fields(manifest = %manifest.display(), resolve = resolver.is_some()))]
pub async fn verify(manifest: &Path, resolver: Option<&ResourceCache>) -> Result<VerifyReport> {
    let header = load_header(manifest).await?;

    // Furthest byte each resource must provide.
    let mut reach: BTreeMap<String, u64> = BTreeMap::new();
    let mut entries = 0u64;
    let mut covered = 0u64;
    let mut stream = std::pin::pin!(entry_stream(manifest.to_path_buf()));
    while let Some(entry) = stream.next().await {
        let entry = entry?;
        entries += 1;
        covered += entry.length;
        let end = reach.entry(entry.url.clone()).or_default();
        *end = (*end).max(entry.end());
    }
    if covered != header.length {
        exn::bail!(ErrorKind::LengthMismatch { expected: header.length, actual: covered });
    }

    let mut report = VerifyReport {
        header,
        entries,
        resources: reach.keys().cloned().collect(),
        unavailable: Vec::new(),
        out_of_range: Vec::new(),
    };
    let Some(cache) = resolver else {
        return Ok(report);
    };

    let mut sizes = BTreeMap::new();
    let mut short = false;
    for (url, end) in &reach {
        match cache.ensure(url).await {
            Ok(entry) => {
                short |= entry.size < *end;
                sizes.insert(url.clone(), entry.size);
            },
            Err(err) if err.is_unavailable() => report.unavailable.push(url.clone()),
            Err(err) => return Err(ErrorKind::cache(err)),
        }
    }
    // Only walk the entries again if some resource is too short.
    if short {
        let mut stream = std::pin::pin!(entry_stream(manifest.to_path_buf()));
        let mut index = 0u64;
        while let Some(entry) = stream.next().await {
            let entry = entry?;
            if sizes.get(&entry.url).is_some_and(|&size| entry.end() > size) {
                report.out_of_range.push((index, entry));
            }
            index += 1;
        }
    }
    tracing::info!(
        entries,
        resources = report.resources.len(),
        unavailable = report.unavailable.len(),
        out_of_range = report.out_of_range.len(),
        "Manifest verified"
    );
    Ok(report)
}
