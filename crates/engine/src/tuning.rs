//! Knobs that trade scan cost against manifest size.

/// Default number of input bytes read per chunk. Smaller chunks scan faster
/// per attempt but produce more manifest entries.
pub const DEFAULT_CHUNK_SIZE: usize = 24;
/// Default size of each read from a mirrored resource while scanning.
pub const DEFAULT_SCAN_WINDOW: usize = 24 * 1024;
/// Default number of resources fetched at once during warm-up.
pub const DEFAULT_FETCH_CONCURRENCY: usize = 8;
/// Default minimum input bytes each worker must get for parallelism to kick in.
pub const DEFAULT_MIN_BYTES_PER_WORKER: u64 = 10;

/// How far to shrink a needle that matched nowhere.
///
/// Holds strictly descending steps. A needle of length `L` shrinks by the
/// first step strictly less than `L`, or by one byte if there is none, so the
/// default ladder `[8, 4, 2]` goes `17 → 9 → 1` and `5 → 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffLadder(Vec<usize>);

impl Default for BackoffLadder {
    fn default() -> Self {
        Self(vec![8, 4, 2])
    }
}

impl BackoffLadder {
    /// Returns `None` unless `steps` is strictly descending and free of zero.
    pub fn new(steps: Vec<usize>) -> Option<Self> {
        let descending = steps.windows(2).all(|pair| pair[0] > pair[1]);
        (descending && !steps.contains(&0)).then_some(Self(steps))
    }

    pub fn steps(&self) -> &[usize] {
        &self.0
    }

    /// The next length to try after `length` matched nowhere. Zero means the
    /// ladder is exhausted.
    pub fn shrink(&self, length: usize) -> usize {
        let step = self.0.iter().copied().find(|&step| length > step).unwrap_or(1);
        length.saturating_sub(step)
    }

    /// Every length tried for a needle of `start` bytes, longest first.
    pub fn lengths(&self, start: usize) -> impl Iterator<Item = usize> + '_ {
        std::iter::successors(Some(start).filter(|&l| l > 0), move |&l| Some(self.shrink(l)).filter(|&l| l > 0))
    }
}

/// Everything the engine needs to know besides its inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tuning {
    pub chunk_size: usize,
    pub scan_window: usize,
    pub ladder: BackoffLadder,
    pub fetch_concurrency: usize,
    pub min_bytes_per_worker: u64,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            scan_window: DEFAULT_SCAN_WINDOW,
            ladder: BackoffLadder::default(),
            fetch_concurrency: DEFAULT_FETCH_CONCURRENCY,
            min_bytes_per_worker: DEFAULT_MIN_BYTES_PER_WORKER,
        }
    }
}
