//! Content-addressed local mirror of remote resources.
//!
//! Every resource (an externally hosted byte sequence identified by URL) is
//! mirrored into one file in the cache directory, named from the BLAKE3 hash
//! of its URL so that names are filesystem-safe and fixed-length no matter
//! what the URL looks like. Mirrors never expire; [`ResourceCache::purge`]
//! removes them explicitly.
//!
//! # Atomic publish
//! A fetched body is streamed into a hidden temporary file inside the cache
//! directory and renamed into place only once the whole body has arrived.
//! An existing mirror is therefore always complete, which is what lets
//! sibling workers race on the first fetch of the same URL: both write their
//! own temporary file and the last rename wins with identical content.

pub mod error;
mod fetch;
mod mirror;

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::instrument;

/// File extension of a published mirror.
pub const EXTENSION: &str = "resource";
/// Prefix and suffix of a mirror still being downloaded. Distinct from any
/// other temporary file opacify writes, so `purge` only ever removes fetches.
pub(crate) const PARTIAL_PREFIX: &str = ".opacify-fetch-";
pub(crate) const PARTIAL_SUFFIX: &str = ".partial";
/// Length of the hex-encoded BLAKE3 stem of a mirror file name.
const STEM_LEN: usize = blake3::OUT_LEN * 2;

/// A resource that is guaranteed to be mirrored locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// The URL the mirror was fetched from.
    pub url: String,
    /// Absolute or caller-relative path of the mirror file.
    pub path: PathBuf,
    /// Size of the mirrored body in bytes.
    pub size: u64,
}

/// Local mirror of remote resources, shared on disk between workers.
///
/// Cloning is cheap (the HTTP client is reference counted), so each worker
/// gets its own handle onto the same directory.
#[derive(Debug, Clone)]
pub struct ResourceCache {
    root: PathBuf,
    client: reqwest::Client,
}

impl ResourceCache {
    /// Open (creating if needed) a cache rooted at `root`. Every network
    /// fetch is bounded by `timeout`.
    pub fn new(root: impl AsRef<Path>, timeout: Duration) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if root.exists() {
            if !root.is_dir() {
                exn::bail!(ErrorKind::InvalidRoot(root));
            }
        } else {
            // Non-async; it happens once, before any worker starts.
            std::fs::create_dir_all(&root).or_raise(|| ErrorKind::InvalidRoot(root.clone()))?;
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("opacify/", env!("CARGO_PKG_VERSION")))
            .build()
            .or_raise(|| ErrorKind::Client)?;
        Ok(Self { root, client })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Deterministic mirror path for a URL.
    ///
    /// ```
    /// use opacify_cache::ResourceCache;
    /// use std::time::Duration;
    ///
    /// let dir = std::env::temp_dir().join("opacify-doc-cache");
    /// let cache = ResourceCache::new(&dir, Duration::from_secs(5)).unwrap();
    /// let a = cache.path_for("https://example.com/a.jpg");
    /// assert_eq!(a, cache.path_for("https://example.com/a.jpg"));
    /// assert_ne!(a, cache.path_for("https://example.com/b.jpg"));
    /// assert_eq!(a.file_name().unwrap().len(), 64 + ".resource".len());
    /// ```
    pub fn path_for(&self, url: &str) -> PathBuf {
        self.root.join(format!("{}.{EXTENSION}", blake3::hash(url.as_bytes()).to_hex()))
    }

    /// Make sure `url` is mirrored locally, fetching the full body on a miss.
    ///
    /// An existing mirror is trusted as complete (see the module docs on
    /// atomic publish). A failed fetch is reported as
    /// [`FetchFailed`](ErrorKind::FetchFailed) and leaves no mirror behind.
    #[instrument(level = "trace", skip(self))]
    pub async fn ensure(&self, url: &str) -> Result<CacheEntry> {
        let path = self.path_for(url);
        match fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => {
                return Ok(CacheEntry { url: url.to_string(), path, size: metadata.len() });
            },
            Ok(_) => exn::bail!(ErrorKind::Io(path)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
            Err(e) => return Err(e).or_raise(|| ErrorKind::Io(path)),
        }
        let size = self.fetch(url, &path).await?;
        tracing::debug!(url, size, path = %path.display(), "Resource mirrored");
        Ok(CacheEntry { url: url.to_string(), path, size })
    }

    /// Read exactly `length` bytes at `offset` from the mirror of `url`,
    /// mirroring it first if needed.
    ///
    /// Fails with [`ShortRead`](ErrorKind::ShortRead) if the resource is
    /// smaller than `offset + length`.
    pub async fn read_slice(&self, url: &str, offset: u64, length: u64) -> Result<Vec<u8>> {
        let entry = self.ensure(url).await?;
        mirror::read_slice(&entry, offset, length).await
    }

    /// Delete every mirror (and abandoned partial download) in the cache
    /// directory. Files not following the cache naming convention are never
    /// touched. Returns the number of files removed.
    #[instrument(skip(self), fields(root = %self.root.display()))]
    pub async fn purge(&self) -> Result<usize> {
        let mut entries = fs::read_dir(&self.root).await.or_raise(|| ErrorKind::Io(self.root.clone()))?;
        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await.or_raise(|| ErrorKind::Io(self.root.clone()))? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !(is_mirror_name(name) || is_partial_name(name)) {
                continue;
            }
            let path = entry.path();
            match fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                // A sibling process got there first.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
                Err(e) => return Err(e).or_raise(|| ErrorKind::Io(path)),
            }
        }
        tracing::info!(removed, "Cache purged");
        Ok(removed)
    }
}

fn is_mirror_name(name: &str) -> bool {
    name.strip_suffix(EXTENSION)
        .and_then(|rest| rest.strip_suffix('.'))
        .is_some_and(|stem| stem.len() == STEM_LEN && stem.bytes().all(|b| b.is_ascii_hexdigit()))
}

fn is_partial_name(name: &str) -> bool {
    name.starts_with(PARTIAL_PREFIX) && name.ends_with(PARTIAL_SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(format!("{}.resource", "a".repeat(64)), true)]
    #[case(format!("{}.resource", "0123456789abcdef".repeat(4)), true)]
    #[case(format!("{}.resource", "a".repeat(63)), false)]
    #[case(format!("{}.resource", "g".repeat(64)), false)]
    #[case(format!("{}.tmp", "a".repeat(64)), false)]
    #[case("notes.resource".to_string(), false)]
    #[case("input.bin".to_string(), false)]
    fn test_is_mirror_name(#[case] name: String, #[case] expected: bool) {
        assert_eq!(is_mirror_name(&name), expected);
    }

    #[rstest]
    #[case(".opacify-fetch-Ab12Cd.partial", true)]
    #[case("opacify-fetch-Ab12Cd.partial", false)]
    #[case(".opacify-fetch-Ab12Cd", false)]
    #[case(".opacify-Ab12Cd.manifest.partial", false)]
    #[case(".opacify-Ab12Cd.partial", false)]
    fn test_is_partial_name(#[case] name: &str, #[case] expected: bool) {
        assert_eq!(is_partial_name(name), expected);
    }

    #[test]
    fn test_new_rejects_file_root() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("not-a-dir");
        std::fs::write(&file, b"").unwrap();
        let err = ResourceCache::new(&file, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidRoot(_)));
    }

    #[test]
    fn test_new_creates_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("a/b/cache");
        let cache = ResourceCache::new(&root, Duration::from_secs(1)).unwrap();
        assert!(root.is_dir());
        assert_eq!(cache.root(), root);
    }

    #[test]
    fn test_path_for_is_content_addressed() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResourceCache::new(dir.path(), Duration::from_secs(1)).unwrap();
        let path = cache.path_for("https://example.com/a");
        assert_eq!(path.parent(), Some(dir.path()));
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(is_mirror_name(name));
        assert!(name.starts_with(blake3::hash(b"https://example.com/a").to_hex().as_str()));
    }
}
