use crate::tuning::Tuning;
use opacify_cache::ResourceCache;
use opacify_manifest::InputHash;
use sha2::{Digest, Sha256};
use std::collections::HashSet;

/// Per-run state handed to the matcher, one per worker.
///
/// Nothing in here is shared between workers: each owns its failed-URL set
/// and digest. The cache handle is a cheap clone onto the same directory.
#[derive(Debug)]
pub struct RunContext {
    pub(crate) cache: ResourceCache,
    pub(crate) tuning: Tuning,
    /// URLs that failed to fetch during this run; never tried again.
    pub(crate) failed: HashSet<String>,
    pub(crate) hasher: Sha256,
    /// Input bytes consumed so far.
    pub(crate) processed: u64,
    /// Resource scans performed, across all needle lengths.
    pub(crate) scans: u64,
}

impl RunContext {
    pub fn new(cache: ResourceCache, tuning: Tuning) -> Self {
        Self { cache, tuning, failed: HashSet::new(), hasher: Sha256::new(), processed: 0, scans: 0 }
    }

    pub fn failed(&self) -> &HashSet<String> {
        &self.failed
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }

    pub fn scans(&self) -> u64 {
        self.scans
    }

    /// Feed consumed input into the running digest.
    pub(crate) fn consume(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
        self.processed += bytes.len() as u64;
    }

    /// Digest and length of everything consumed.
    pub(crate) fn finalize(&self) -> (InputHash, u64) {
        (self.hasher.clone().into(), self.processed)
    }
}
