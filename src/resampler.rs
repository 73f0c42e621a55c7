//! Bootstrap subsampling
//!
//! Draws an owned sub-dataset of a requested size from a dataset, with or
//! without replacement. Each draw is independent; the subsample belongs
//! to the task that requested it and is discarded when the run completes.
//!
//! Reproducibility: when the caller supplies a seed, one shared
//! [`RandomSource`] is constructed for the whole aggregation run and
//! reused across all draws, so the run is reproducible even though draws
//! happen concurrently. Unseeded runs use an unsynchronized thread-local
//! generator per draw.

use crate::dataset::SampleSet;
use crate::error::{Result, StabilityError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// How each run's subsample is sized and drawn.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SampleStyle {
    /// `n` rows with replacement (the classic bootstrap).
    Bootstrap,
    /// `n / 2` rows without replacement (complementary-pairs style).
    Split,
    /// An explicit row count.
    Fixed { size: usize, with_replacement: bool },
    /// A percentage of the row count, e.g. `percent: 80.0`.
    Fraction { percent: f64, with_replacement: bool },
}

impl SampleStyle {
    /// Resolve to a concrete (size, with_replacement) for a dataset.
    pub fn resolve(&self, row_count: usize) -> (usize, bool) {
        match *self {
            SampleStyle::Bootstrap => (row_count, true),
            SampleStyle::Split => (row_count / 2, false),
            SampleStyle::Fixed {
                size,
                with_replacement,
            } => (size, with_replacement),
            SampleStyle::Fraction {
                percent,
                with_replacement,
            } => {
                let size = ((percent / 100.0) * row_count as f64).round() as usize;
                (size, with_replacement)
            }
        }
    }
}

/// Shared random source for one aggregation run.
pub enum RandomSource {
    /// Deterministic generator shared by every draw of the run.
    Seeded(Mutex<StdRng>),
    /// Per-draw `thread_rng`; no cross-draw coordination.
    ThreadLocal,
}

impl RandomSource {
    pub fn from_seed(seed: Option<u64>) -> Arc<Self> {
        Arc::new(match seed {
            Some(s) => RandomSource::Seeded(Mutex::new(StdRng::seed_from_u64(s))),
            None => RandomSource::ThreadLocal,
        })
    }

    /// Draw `size` row indices uniformly from `0..row_count`.
    fn draw_indices(&self, row_count: usize, size: usize, with_replacement: bool) -> Vec<usize> {
        match self {
            RandomSource::Seeded(rng) => {
                let mut rng = rng.lock().expect("random source poisoned");
                Self::indices(&mut *rng, row_count, size, with_replacement)
            }
            RandomSource::ThreadLocal => {
                let mut rng = rand::thread_rng();
                Self::indices(&mut rng, row_count, size, with_replacement)
            }
        }
    }

    fn indices<R: Rng>(
        rng: &mut R,
        row_count: usize,
        size: usize,
        with_replacement: bool,
    ) -> Vec<usize> {
        if with_replacement {
            (0..size).map(|_| rng.gen_range(0..row_count)).collect()
        } else {
            rand::seq::index::sample(rng, row_count, size).into_vec()
        }
    }
}

/// Draws bootstrap subsamples.
pub struct Resampler;

impl Resampler {
    /// Draw a subsample of `size` rows.
    ///
    /// With replacement, each of the `size` picks is independent and
    /// uniform over all rows (duplicates allowed). Without replacement,
    /// `size` distinct rows are chosen uniformly; `size` must not exceed
    /// the row count.
    pub fn draw(
        data: &dyn SampleSet,
        size: usize,
        with_replacement: bool,
        source: &RandomSource,
    ) -> Result<Arc<dyn SampleSet>> {
        let rows = data.row_count();

        if size == 0 {
            return Err(StabilityError::invalid(
                "size",
                "subsample size must be positive",
            ));
        }

        if !with_replacement && size > rows {
            return Err(StabilityError::invalid(
                "size",
                format!(
                    "cannot draw {} distinct rows from {} without replacement",
                    size, rows
                ),
            ));
        }

        if rows == 0 {
            return Err(StabilityError::invalid("data", "dataset has no rows"));
        }

        let indices = source.draw_indices(rows, size, with_replacement);
        Ok(data.row_subset(&indices))
    }

    /// Draw according to a [`SampleStyle`].
    pub fn draw_styled(
        data: &dyn SampleSet,
        style: SampleStyle,
        source: &RandomSource,
    ) -> Result<Arc<dyn SampleSet>> {
        let (size, with_replacement) = style.resolve(data.row_count());
        Self::draw(data, size, with_replacement, source)
    }
}
