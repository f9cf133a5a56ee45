//! `opacify`: encode a file as references into resources hosted elsewhere,
//! and rebuild it from those references.
//!
//! # Usage
//!
//! ```text
//! opacify pacify -i secret.bin -u urls.txt -m secret.manifest
//! opacify pacify -i big.iso -u urls.txt -m big.manifest.gz -w 8
//! opacify satisfy -m secret.manifest -o secret.bin
//! opacify verify -m secret.manifest --resolve
//! opacify purge
//! ```

mod error;

use crate::error::{ErrorKind, Result};
use clap::{Parser, Subcommand};
use opacify_cache::ResourceCache;
use opacify_config::Config;
use opacify_engine::{PacifyOptions, pacify, read_url_list, satisfy, verify};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

// -----------------------------------------------------------------------
// CLI definition
// -----------------------------------------------------------------------

#[derive(Debug, Parser)]
#[command(name = "opacify", version, about = "Store files as references into resources that already exist")]
struct Cli {
    /// Configuration file (TOML, YAML or JSON).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Turn on debug output.
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Encode a file into a manifest.
    Pacify {
        /// File to encode.
        #[arg(short, long)]
        input: PathBuf,
        /// Candidate resources, one URL per line.
        #[arg(short, long)]
        urls: PathBuf,
        /// Where to write the manifest. A `.gz`/`.bz2` extension compresses it.
        #[arg(short, long)]
        manifest: PathBuf,
        #[command(flatten)]
        cache: CacheArgs,
        /// Overwrite the manifest if it exists.
        #[arg(short, long)]
        force: bool,
        /// Split the input across this many workers.
        #[arg(short, long)]
        workers: Option<usize>,
    },
    /// Rebuild a file from its manifest.
    #[command(alias = "depacify")]
    Satisfy {
        #[arg(short, long)]
        manifest: PathBuf,
        /// Where to write the rebuilt file.
        #[arg(short, long)]
        out: PathBuf,
        #[command(flatten)]
        cache: CacheArgs,
        /// Overwrite the output if it exists.
        #[arg(short, long)]
        force: bool,
    },
    /// Check a manifest without rebuilding anything.
    Verify {
        #[arg(short, long)]
        manifest: PathBuf,
        /// Also fetch every referenced resource and check entries against it.
        #[arg(long)]
        resolve: bool,
        /// Cache directory (overrides configuration).
        #[arg(short, long)]
        cache: Option<PathBuf>,
    },
    /// Remove every mirrored resource from the cache.
    Purge {
        /// Cache directory (overrides configuration).
        #[arg(short, long)]
        cache: Option<PathBuf>,
    },
}

#[derive(Debug, clap::Args)]
struct CacheArgs {
    /// Cache directory (overrides configuration).
    #[arg(short, long)]
    cache: Option<PathBuf>,
    /// Keep mirrored resources after a successful run.
    #[arg(short, long)]
    keep: bool,
}

// -----------------------------------------------------------------------
// Entrypoint
// -----------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_tracing(cli.debug);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}: {}", err.code(), &*err);
            eprintln!("{err:?}");
            ExitCode::FAILURE
        },
    }
}

/// `RUST_LOG` wins; otherwise opacify's own crates log at `info`, or `debug`
/// with `--debug`.
fn setup_tracing(debug: bool) {
    let level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,opacify={level},opacify_cache={level},opacify_config={level},opacify_engine={level},opacify_manifest={level}"
        ))
    });
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load(cli.config.as_deref()).map_err(ErrorKind::config)?;
    tracing::debug!(?config, "Configuration loaded");

    match cli.command {
        Commands::Pacify { input, urls, manifest, cache, force, workers } => {
            override_cache(&mut config, cache.cache);
            cmd_pacify(&config, &input, &urls, &manifest, force, workers.or(config.workers.count), cache.keep).await
        },
        Commands::Satisfy { manifest, out, cache, force } => {
            override_cache(&mut config, cache.cache);
            cmd_satisfy(&config, &manifest, &out, force, cache.keep).await
        },
        Commands::Verify { manifest, resolve, cache } => {
            override_cache(&mut config, cache);
            cmd_verify(&config, &manifest, resolve).await
        },
        Commands::Purge { cache } => {
            override_cache(&mut config, cache);
            cmd_purge(&config).await
        },
    }
}

fn override_cache(config: &mut Config, cache: Option<PathBuf>) {
    if let Some(dir) = cache {
        config.cache_dir = dir;
    }
}

fn open_cache(config: &Config) -> Result<ResourceCache> {
    ResourceCache::new(&config.cache_dir, config.timeout()).map_err(ErrorKind::cache)
}

/// Failed runs keep the cache so a retry does not fetch everything again.
async fn purge_after_success(cache: &ResourceCache, keep: bool) {
    if keep {
        return;
    }
    if let Err(err) = cache.purge().await {
        let reason = &*err;
        tracing::warn!(error = %reason, "Could not purge the resource cache");
    }
}

// -----------------------------------------------------------------------
// Commands
// -----------------------------------------------------------------------

async fn cmd_pacify(
    config: &Config,
    input: &Path,
    urls: &Path,
    manifest: &Path,
    force: bool,
    workers: Option<usize>,
    keep: bool,
) -> Result<()> {
    let candidates = read_url_list(urls).await.map_err(ErrorKind::engine)?;
    let cache = open_cache(config)?;
    let options = PacifyOptions {
        workers,
        overwrite: force,
        compression: config.manifest.compression,
        tuning: config.tuning().map_err(ErrorKind::config)?,
    };
    let report = pacify(&cache, input, &candidates, manifest, &options).await.map_err(ErrorKind::engine)?;

    println!("Wrote manifest to: {}", report.manifest.display());
    println!("    Manifest size: {}", report.manifest_size);
    println!("    Original size: {}", report.length);
    println!("     Input sha256: {}", report.hash);
    println!("          Entries: {}", report.entries);
    println!("          Workers: {}", report.workers);
    if !report.unavailable.is_empty() {
        println!("      Unavailable: {}", report.unavailable.len());
    }
    println!("         Duration: {:.3}s", report.duration.as_secs_f64());

    purge_after_success(&cache, keep).await;
    Ok(())
}

async fn cmd_satisfy(config: &Config, manifest: &Path, out: &Path, force: bool, keep: bool) -> Result<()> {
    let cache = open_cache(config)?;
    let report = satisfy(&cache, manifest, out, force).await.map_err(ErrorKind::engine)?;

    println!("Wrote output to: {}", report.output.display());
    println!("    Manifest size: {}", report.manifest_size);
    println!("    Output sha256: {}", report.hash);
    println!("      Output size: {}", report.length);
    println!("         Duration: {:.3}s", report.duration.as_secs_f64());

    purge_after_success(&cache, keep).await;
    Ok(())
}

async fn cmd_verify(config: &Config, manifest: &Path, resolve: bool) -> Result<()> {
    let cache = if resolve { Some(open_cache(config)?) } else { None };
    let report = verify(manifest, cache.as_ref()).await.map_err(ErrorKind::engine)?;

    println!("Manifest: {}", manifest.display());
    println!("   Format version: {}", report.header.version);
    println!("    Declared size: {}", report.header.length);
    println!("  Declared sha256: {}", report.header.hash);
    println!("          Entries: {}", report.entries);
    println!("        Resources: {}", report.resources.len());
    for url in &report.unavailable {
        println!("      Unavailable: {url}");
    }
    for (index, entry) in &report.out_of_range {
        println!("     Out of range: entry {index}: {entry}");
    }

    let problems = report.unavailable.len() + report.out_of_range.len();
    if problems > 0 {
        exn::bail!(ErrorKind::Unverified(problems));
    }
    Ok(())
}

async fn cmd_purge(config: &Config) -> Result<()> {
    let cache = open_cache(config)?;
    let removed = cache.purge().await.map_err(ErrorKind::cache)?;
    println!("Removed {removed} file(s) from {}", cache.root().display());
    Ok(())
}
