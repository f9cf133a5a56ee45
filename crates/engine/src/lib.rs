//! Encode a file as references into resources that already exist elsewhere,
//! and rebuild it from those references.
//!
//! - [`pacify`] reads the input chunk by chunk and, for each chunk, asks the
//!   [matcher](find) for the longest prefix (on the backoff ladder) that some
//!   candidate resource contains. Each match becomes one manifest entry.
//!   Large inputs can be split across workers whose shard manifests are
//!   merged in input order.
//! - [`satisfy`] replays a manifest against the resource cache and checks the
//!   rebuilt file against the manifest's digest and length.
//! - [`verify`] checks a manifest without rebuilding anything.
//!
//! Resources are mirrored through [`opacify_cache::ResourceCache`]; every
//! operation takes one, and workers share its directory.

mod context;
mod coordinator;
mod cover;
mod digest;
pub mod error;
mod matcher;
mod satisfy;
mod sink;
mod tuning;
mod urls;
mod verify;

pub use crate::context::RunContext;
pub use crate::coordinator::{PacifyOptions, PacifyReport, RangeReport, pacify};
pub use crate::digest::digest_file;
pub use crate::matcher::{Match, find};
pub use crate::satisfy::{SatisfyReport, satisfy};
pub use crate::tuning::{
    BackoffLadder, DEFAULT_CHUNK_SIZE, DEFAULT_FETCH_CONCURRENCY, DEFAULT_MIN_BYTES_PER_WORKER, DEFAULT_SCAN_WINDOW,
    Tuning,
};
pub use crate::urls::read_url_list;
pub use crate::verify::{VerifyReport, verify};
