//! Instability-driven regularization search
//!
//! Treats a scalar regularization parameter as the resampled quantity:
//! at each candidate value a full subsampled ensemble is run and its
//! pairwise-adjacency instability measured. The search walks the
//! parameter range from its stable end and stops at the boundary value
//! whose instability still satisfies the cutoff, after:
//!
//! Liu, H., Roeder, K., and Wasserman, L. (2010). Stability Approach to
//! Regularization Selection (StARS) for high dimensional graphical
//! models. NIPS 23.
//!
//! The instability statistic at a parameter value is
//! `D = mean over unordered variable pairs of 2·θ·(1−θ)`, where θ is the
//! fraction of ensemble runs in which that pair is adjacent. D is 0 when
//! every run agrees and peaks when runs disagree half the time.

use crate::align::CanonicalVariables;
use crate::dataset::SampleSet;
use crate::error::{Result, StabilityError};
use crate::graph::{EdgeKey, StructureGraph};
use crate::resampler::{RandomSource, Resampler, SampleStyle};
use crate::statistics;
use crate::worker_pool::{Task, WorkerPool};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Injected discovery procedure parameterized by the swept value.
pub type ParamSearchFn =
    dyn Fn(&dyn SampleSet, f64) -> anyhow::Result<StructureGraph> + Send + Sync;

/// Which end of `[low, high]` is the stable (conservative) end the
/// search starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StableEnd {
    Low,
    High,
}

/// Interval-narrowing strategy. Both drivers satisfy the same contract:
/// return the boundary value, found by monotonically narrowing the
/// search interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SearchMode {
    /// Walk a fixed grid from the stable end; stop at the first value
    /// whose instability exceeds the cutoff.
    Scan { step: f64 },
    /// Bisect the interval until it shrinks below the tolerance.
    Bisection { tolerance: f64 },
}

/// Search state machine (see module docs). One full subsampled ensemble
/// runs per `Evaluating` state.
#[derive(Debug, Clone, Copy, PartialEq)]
enum SearchState {
    Init,
    Evaluating(f64),
    Decide { value: f64, instability: f64 },
    Converged(f64),
}

/// Configuration for the curve search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StabilityConfig {
    /// Instability cutoff β.
    pub beta: f64,
    /// Lower bound of the parameter range.
    pub low: f64,
    /// Upper bound of the parameter range.
    pub high: f64,
    /// Which end of the range is stable.
    pub stable_end: StableEnd,
    pub mode: SearchMode,
    /// Ensemble size per evaluated value.
    pub num_subsamples: usize,
    pub sample_style: SampleStyle,
    pub parallelism: i32,
    pub seed: Option<u64>,
    pub drain_budget_secs: u64,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            beta: 0.05,
            low: 0.0,
            high: 1.0,
            stable_end: StableEnd::High,
            mode: SearchMode::Scan { step: 0.05 },
            num_subsamples: 20,
            sample_style: SampleStyle::Split,
            parallelism: 0,
            seed: None,
            drain_budget_secs: 24 * 60 * 60,
        }
    }
}

impl StabilityConfig {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.low >= self.high {
            return Err(format!(
                "low must be < high, got [{}, {}]",
                self.low, self.high
            ));
        }
        if !(0.0..=1.0).contains(&self.beta) || self.beta == 0.0 {
            return Err(format!("beta must be in (0, 1], got {}", self.beta));
        }
        if self.num_subsamples < 1 {
            return Err("num_subsamples must be >= 1".to_string());
        }
        match self.mode {
            SearchMode::Scan { step } if step <= 0.0 => {
                Err(format!("scan step must be positive, got {}", step))
            }
            SearchMode::Bisection { tolerance } if tolerance <= 0.0 => {
                Err(format!("tolerance must be positive, got {}", tolerance))
            }
            _ => Ok(()),
        }
    }
}

/// Final answer of a curve search.
#[derive(Debug)]
pub struct StabilitySelection {
    /// The chosen parameter value.
    pub value: f64,
    /// Instability measured at the chosen value.
    pub instability: f64,
    /// One final full-dataset discovery run at the chosen value (not
    /// part of any ensemble).
    pub graph: StructureGraph,
    /// Every (value, D) evaluation in the order performed.
    pub history: Vec<(f64, f64)>,
}

/// Searches a parameter range for the boundary value whose ensemble
/// instability stays below the cutoff.
pub struct StabilityCurveSearch {
    config: StabilityConfig,
}

impl StabilityCurveSearch {
    pub fn new(config: StabilityConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|reason| StabilityError::invalid("config", reason))?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &StabilityConfig {
        &self.config
    }

    /// Run the search to convergence, then run the discovery procedure
    /// once on the full dataset at the chosen value.
    pub fn run(
        &self,
        data: Arc<dyn SampleSet>,
        search: Arc<ParamSearchFn>,
    ) -> Result<StabilitySelection> {
        let canonical = Arc::new(CanonicalVariables::from_names(data.variable_names()));
        let mut history = Vec::new();

        let chosen = match self.config.mode {
            SearchMode::Scan { step } => {
                self.scan(&data, &search, &canonical, step, &mut history)?
            }
            SearchMode::Bisection { tolerance } => {
                self.bisect(&data, &search, &canonical, tolerance, &mut history)?
            }
        };

        let instability = history
            .iter()
            .rev()
            .find(|(v, _)| *v == chosen)
            .map_or(0.0, |&(_, d)| d);

        // Final, non-ensemble run on the full original dataset
        let graph = search(&*data, chosen).map_err(|e| StabilityError::Search(e.to_string()))?;
        let graph = canonical.align(&graph)?;

        Ok(StabilitySelection {
            value: chosen,
            instability,
            graph,
            history,
        })
    }

    /// Grid walk from the stable end. Under a monotone instability curve
    /// the first value past the cutoff ends the search; the previous
    /// value is the boundary.
    fn scan(
        &self,
        data: &Arc<dyn SampleSet>,
        search: &Arc<ParamSearchFn>,
        canonical: &Arc<CanonicalVariables>,
        step: f64,
        history: &mut Vec<(f64, f64)>,
    ) -> Result<f64> {
        let mut best: Option<f64> = None;
        let mut state = SearchState::Init;

        loop {
            state = match state {
                SearchState::Init => SearchState::Evaluating(self.start_value()),
                SearchState::Evaluating(value) => {
                    let d = self.evaluate(data, search, canonical, value)?;
                    history.push((value, d));
                    debug!(value, instability = d, "evaluated");
                    SearchState::Decide {
                        value,
                        instability: d,
                    }
                }
                SearchState::Decide { value, instability } => {
                    if instability <= self.config.beta {
                        best = Some(value);
                        match self.next_value(value, step) {
                            Some(next) => SearchState::Evaluating(next),
                            None => SearchState::Converged(value),
                        }
                    } else {
                        match best {
                            Some(b) => SearchState::Converged(b),
                            None => {
                                return Err(StabilityError::Search(format!(
                                    "no parameter value satisfied instability cutoff {}",
                                    self.config.beta
                                )))
                            }
                        }
                    }
                }
                SearchState::Converged(value) => return Ok(value),
            };
        }
    }

    /// Bisection: keep a stable endpoint and an unstable endpoint and
    /// narrow until the interval is within tolerance. The stable
    /// endpoint of the final interval is the answer.
    fn bisect(
        &self,
        data: &Arc<dyn SampleSet>,
        search: &Arc<ParamSearchFn>,
        canonical: &Arc<CanonicalVariables>,
        tolerance: f64,
        history: &mut Vec<(f64, f64)>,
    ) -> Result<f64> {
        let (mut stable, mut unstable) = match self.config.stable_end {
            StableEnd::High => (self.config.high, self.config.low),
            StableEnd::Low => (self.config.low, self.config.high),
        };

        let d_stable = self.evaluate(data, search, canonical, stable)?;
        history.push((stable, d_stable));
        if d_stable > self.config.beta {
            return Err(StabilityError::Search(format!(
                "instability {} at the stable end already exceeds cutoff {}",
                d_stable, self.config.beta
            )));
        }

        let d_unstable = self.evaluate(data, search, canonical, unstable)?;
        history.push((unstable, d_unstable));
        if d_unstable <= self.config.beta {
            // The whole range is stable; the aggressive end is the boundary
            return Ok(unstable);
        }

        let mut state = SearchState::Init;

        loop {
            state = match state {
                SearchState::Init => SearchState::Evaluating((stable + unstable) / 2.0),
                SearchState::Evaluating(value) => {
                    let d = self.evaluate(data, search, canonical, value)?;
                    history.push((value, d));
                    debug!(value, instability = d, "bisection step");
                    SearchState::Decide {
                        value,
                        instability: d,
                    }
                }
                SearchState::Decide { value, instability } => {
                    if instability <= self.config.beta {
                        stable = value;
                    } else {
                        unstable = value;
                    }
                    if (stable - unstable).abs() <= tolerance {
                        SearchState::Converged(stable)
                    } else {
                        SearchState::Evaluating((stable + unstable) / 2.0)
                    }
                }
                SearchState::Converged(value) => return Ok(value),
            };
        }
    }

    fn start_value(&self) -> f64 {
        match self.config.stable_end {
            StableEnd::High => self.config.high,
            StableEnd::Low => self.config.low,
        }
    }

    /// Next grid value walking from the stable end toward the other,
    /// or `None` past the range.
    fn next_value(&self, current: f64, step: f64) -> Option<f64> {
        match self.config.stable_end {
            StableEnd::High => {
                let next = current - step;
                (next >= self.config.low - 1e-12).then_some(next.max(self.config.low))
            }
            StableEnd::Low => {
                let next = current + step;
                (next <= self.config.high + 1e-12).then_some(next.min(self.config.high))
            }
        }
    }

    /// Run one full subsampled ensemble at `value` and compute D.
    fn evaluate(
        &self,
        data: &Arc<dyn SampleSet>,
        search: &Arc<ParamSearchFn>,
        canonical: &Arc<CanonicalVariables>,
        value: f64,
    ) -> Result<f64> {
        let source = RandomSource::from_seed(self.config.seed);
        let style = self.config.sample_style;
        let mut tasks: Vec<Task<StructureGraph>> =
            Vec::with_capacity(self.config.num_subsamples);

        for _ in 0..self.config.num_subsamples {
            let data = Arc::clone(data);
            let search = Arc::clone(search);
            let canonical = Arc::clone(canonical);

            let source = Arc::clone(&source);
            tasks.push(Box::new(move || {
                let sample = Resampler::draw_styled(&*data, style, &source)?;
                let result = search(&*sample, value)?;
                Ok(canonical.align(&result)?)
            }));
        }

        let attempted = tasks.len();
        let pool = WorkerPool::new(self.config.parallelism)
            .with_drain_budget(Duration::from_secs(self.config.drain_budget_secs));
        let outcome = pool.run(tasks)?;

        if outcome.succeeded == 0 {
            return Err(StabilityError::EmptyEnsemble { attempted });
        }
        if outcome.failed > 0 {
            warn!(
                value,
                failed = outcome.failed,
                "ensemble runs excluded at this parameter value"
            );
        }

        Ok(Self::instability(
            canonical.names(),
            &outcome.results,
            outcome.succeeded,
        ))
    }

    /// `D = mean over unordered pairs of 2·θ·(1−θ)`.
    fn instability(variables: &[String], graphs: &[StructureGraph], runs: usize) -> f64 {
        let mut adjacency: HashMap<EdgeKey, usize> = HashMap::new();
        for graph in graphs {
            for edge in graph.distinct_pairs() {
                *adjacency.entry(edge.key).or_insert(0) += 1;
            }
        }

        let p = variables.len();
        let mut terms = Vec::with_capacity(p * (p - 1) / 2);

        for i in 0..p {
            for j in (i + 1)..p {
                let key = EdgeKey::new(&variables[i], &variables[j]);
                let theta = adjacency.get(&key).copied().unwrap_or(0) as f64 / runs as f64;
                terms.push(2.0 * theta * (1.0 - theta));
            }
        }

        statistics::mean(&terms)
    }
}
