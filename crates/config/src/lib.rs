//! Layered configuration for opacify.
//!
//! Layers are merged lowest to highest:
//!
//! 1. Built-in defaults ([`Config::default`]).
//! 2. `config.toml` in the platform configuration directory, if present
//!    ([`user_config_file`]).
//! 3. An explicitly requested file, TOML, YAML or JSON by extension.
//! 4. Environment variables prefixed `OPACIFY_`, with nested keys separated by
//!    a double underscore (`OPACIFY_NETWORK__TIMEOUT_SECS=5`).
//!
//! Command-line flags are applied on top by the binary.

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::OptionExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use opacify_compress::Compression;
use opacify_engine::{
    BackoffLadder, DEFAULT_CHUNK_SIZE, DEFAULT_FETCH_CONCURRENCY, DEFAULT_MIN_BYTES_PER_WORKER, DEFAULT_SCAN_WINDOW,
    Tuning,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application name used for platform directories.
pub const APP_NAME: &str = "opacify";
/// Prefix of environment variables read as the top layer.
pub const ENV_PREFIX: &str = "OPACIFY_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where mirrored resources live.
    pub cache_dir: PathBuf,
    pub matching: Matching,
    pub network: Network,
    pub workers: Workers,
    pub manifest: Manifest,
}

impl Default for Config {
    fn default() -> Self {
        let cache_dir = ProjectDirs::from("", "", APP_NAME)
            .map(|dirs| dirs.cache_dir().join("resources"))
            .unwrap_or_else(|| PathBuf::from("cache"));
        Self {
            cache_dir,
            matching: Matching::default(),
            network: Network::default(),
            workers: Workers::default(),
            manifest: Manifest::default(),
        }
    }
}

/// `[matching]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Matching {
    /// Input bytes read per chunk.
    pub chunk_size: usize,
    /// Bytes read per window while scanning a resource.
    pub scan_window: usize,
    /// Backoff ladder steps, strictly descending.
    pub backoff: Vec<usize>,
}

impl Default for Matching {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            scan_window: DEFAULT_SCAN_WINDOW,
            backoff: BackoffLadder::default().steps().to_vec(),
        }
    }
}

/// `[network]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Network {
    pub timeout_secs: u64,
    /// Resources fetched at once while warming the cache.
    pub concurrency: usize,
}

impl Default for Network {
    fn default() -> Self {
        Self { timeout_secs: 30, concurrency: DEFAULT_FETCH_CONCURRENCY }
    }
}

/// `[workers]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Workers {
    /// Unset runs a single worker.
    pub count: Option<usize>,
    pub min_bytes_per_worker: u64,
}

impl Default for Workers {
    fn default() -> Self {
        Self { count: None, min_bytes_per_worker: DEFAULT_MIN_BYTES_PER_WORKER }
    }
}

/// `[manifest]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Manifest {
    /// Unset infers the format from the manifest's extension.
    pub compression: Option<Compression>,
}

/// Path of the per-user configuration file, whether or not it exists.
pub fn user_config_file() -> Option<PathBuf> {
    ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().join("config.toml"))
}

impl Config {
    /// Load every layer, with `explicit` (if any) above the user's file.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        Self::load_layers(user_config_file().as_deref(), explicit)
    }

    /// Load with a specific user configuration file instead of the platform
    /// default. A missing user file is skipped; a missing explicit file is
    /// an error.
    pub fn load_layers(user: Option<&Path>, explicit: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = user.filter(|path| path.is_file()) {
            tracing::debug!(path = %path.display(), "Reading user configuration");
            figment = figment.merge(Toml::file(path));
        }
        if let Some(path) = explicit {
            if !path.is_file() {
                exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
            }
            tracing::debug!(path = %path.display(), "Reading configuration");
            figment = match path.extension().and_then(|ext| ext.to_str()) {
                Some("toml") => figment.merge(Toml::file(path)),
                Some("yaml" | "yml") => figment.merge(Yaml::file(path)),
                Some("json") => figment.merge(Json::file(path)),
                _ => exn::bail!(ErrorKind::UnsupportedFormat(path.to_path_buf())),
            };
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Self = figment.extract().map_err(|err| ErrorKind::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: &str| -> Result<()> { exn::bail!(ErrorKind::Invalid(message.to_string())) };
        if self.matching.chunk_size == 0 {
            return invalid("matching.chunk_size must be at least 1");
        }
        if self.matching.scan_window < self.matching.chunk_size {
            return invalid("matching.scan_window must not be smaller than matching.chunk_size");
        }
        if BackoffLadder::new(self.matching.backoff.clone()).is_none() {
            return invalid("matching.backoff must be strictly descending and must not contain 0");
        }
        if self.network.timeout_secs == 0 {
            return invalid("network.timeout_secs must be at least 1");
        }
        if self.network.concurrency == 0 {
            return invalid("network.concurrency must be at least 1");
        }
        if self.workers.count == Some(0) {
            return invalid("workers.count must be at least 1");
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.network.timeout_secs)
    }

    /// Engine tuning derived from these settings.
    pub fn tuning(&self) -> Result<Tuning> {
        let ladder = BackoffLadder::new(self.matching.backoff.clone())
            .ok_or_raise(|| ErrorKind::Invalid("matching.backoff".to_string()))?;
        Ok(Tuning {
            chunk_size: self.matching.chunk_size,
            scan_window: self.matching.scan_window,
            ladder,
            fetch_concurrency: self.network.concurrency,
            min_bytes_per_worker: self.workers.min_bytes_per_worker,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.tuning().unwrap(), Tuning::default());
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.manifest.compression, None);
    }

    #[rstest]
    #[case::zero_chunk(|c: &mut Config| c.matching.chunk_size = 0)]
    #[case::small_window(|c: &mut Config| c.matching.scan_window = 4)]
    #[case::ascending_ladder(|c: &mut Config| c.matching.backoff = vec![2, 4])]
    #[case::zero_step(|c: &mut Config| c.matching.backoff = vec![4, 0])]
    #[case::zero_timeout(|c: &mut Config| c.network.timeout_secs = 0)]
    #[case::zero_concurrency(|c: &mut Config| c.network.concurrency = 0)]
    #[case::zero_workers(|c: &mut Config| c.workers.count = Some(0))]
    fn test_validate_rejects(#[case] change: fn(&mut Config)) {
        let mut config = Config::default();
        change(&mut config);
        let err = config.validate().unwrap_err();
        assert!(matches!(&*err, ErrorKind::Invalid(_)));
    }

    #[test]
    fn test_empty_ladder_is_allowed() {
        // Every miss then shrinks by one byte.
        let mut config = Config::default();
        config.matching.backoff = Vec::new();
        config.validate().unwrap();
        assert_eq!(config.tuning().unwrap().ladder.shrink(5), 4);
    }
}
