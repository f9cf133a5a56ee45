#![allow(dead_code)]

use opacify_cache::ResourceCache;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

/// Nothing listens on the discard port, so fetching this fails fast.
pub const DEAD_URL: &str = "http://127.0.0.1:9/gone.jpg";

/// A scratch directory with a resource cache inside it. Resources are placed
/// straight into the cache, so nothing goes over the network.
pub struct Fixture {
    pub dir: TempDir,
    pub cache: ResourceCache,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResourceCache::new(dir.path().join("cache"), Duration::from_secs(2)).unwrap();
        Self { dir, cache }
    }

    /// Mirror `body` as the resource `https://resources.invalid/<name>`.
    pub fn resource(&self, name: &str, body: &[u8]) -> String {
        let url = format!("https://resources.invalid/{name}");
        std::fs::write(self.cache.path_for(&url), body).unwrap();
        url
    }

    pub fn file(&self, name: &str, body: &[u8]) -> PathBuf {
        let path = self.path(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Names in the scratch directory, apart from the cache, sorted.
    pub fn listing(&self) -> Vec<String> {
        let mut names: Vec<_> = std::fs::read_dir(self.dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .filter(|name| name != "cache")
            .collect();
        names.sort();
        names
    }
}

/// Deterministic bytes that are not a simple run.
pub fn sample_input(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 37 % 251) as u8).collect()
}

/// A resource containing every byte value past offset zero, so any input
/// can be covered one byte at a time.
pub fn every_byte() -> Vec<u8> {
    let mut body = vec![b'#'];
    body.extend(0..=u8::MAX);
    body
}
