//! Bootstrap ensemble orchestration
//!
//! Wires the resampler, worker pool, aligner, and frequency aggregator
//! into the two top-level flows:
//!
//! - [`BootstrapEnsemble`]: B resampled structure-discovery runs,
//!   aligned and counted per edge, reduced to a consensus graph by the
//!   threshold policy.
//! - [`RankedEnsemble`]: the target-relative variant, where each run
//!   produces an ordered candidate list and the q-sweep policy picks the
//!   output set.
//!
//! Per-task failures (degenerate samples, inner-search errors, identity
//! mismatches) are recovered and counted, never propagated; the caller
//! reads `succeeded`/`failed` from the outcome. Only configuration
//! errors, a pool that never drains, and an ensemble with zero
//! survivors are fatal.

use crate::align::CanonicalVariables;
use crate::dataset::SampleSet;
use crate::error::{Result, StabilityError};
use crate::frequency::{FrequencySnapshot, FrequencyTable, RankedFrequencyTable, RankedSnapshot};
use crate::graph::StructureGraph;
use crate::resampler::{RandomSource, Resampler, SampleStyle};
use crate::selection::{SweepPolicy, SweepSelection, ThresholdPolicy};
use crate::worker_pool::{Task, WorkerPool};
use serde::{Deserialize, Serialize};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Injected structure-discovery procedure: a pure function from a sample
/// to a discovered structure.
pub type SearchFn = dyn Fn(&dyn SampleSet) -> anyhow::Result<StructureGraph> + Send + Sync;

/// Injected target-relative ranking procedure: orders candidate
/// variables by estimated effect magnitude on the target, best first.
pub type RankFn =
    dyn Fn(&dyn SampleSet, &str) -> anyhow::Result<Vec<(String, f64)>> + Send + Sync;

/// Configuration for one aggregation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleConfig {
    /// Number of resampled runs.
    pub num_runs: usize,

    /// Subsample sizing and draw mode.
    pub sample_style: SampleStyle,

    /// Concurrent task bound; <= 0 means all available parallelism.
    pub parallelism: i32,

    /// Optional seed. When set, one shared random source is used across
    /// all draws so the run is reproducible despite concurrency.
    pub seed: Option<u64>,

    /// Also run once on the full, un-resampled dataset and blend that
    /// result into the same aggregation, counted like any other run.
    pub add_original: bool,

    /// Threshold-mode inclusion cutoff (strict), e.g. 0.5.
    pub threshold_fraction: f64,

    /// Pool drain budget in seconds before the run dies with
    /// `PoolTimeout`.
    pub drain_budget_secs: u64,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            num_runs: 30,
            sample_style: SampleStyle::Bootstrap,
            parallelism: 0,
            seed: None,
            add_original: false,
            threshold_fraction: 0.5,
            drain_budget_secs: 24 * 60 * 60,
        }
    }
}

impl EnsembleConfig {
    /// Validate configuration before any task is launched.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.num_runs < 1 {
            return Err(format!("num_runs must be >= 1, got {}", self.num_runs));
        }

        if !(0.0..=1.0).contains(&self.threshold_fraction) {
            return Err(format!(
                "threshold_fraction must be in [0, 1], got {}",
                self.threshold_fraction
            ));
        }

        if let SampleStyle::Fraction { percent, .. } = self.sample_style {
            if percent <= 0.0 || percent > 100.0 {
                return Err(format!(
                    "resample percent must be in (0, 100], got {}",
                    percent
                ));
            }
        }

        if self.drain_budget_secs == 0 {
            return Err("drain_budget_secs must be positive".to_string());
        }

        Ok(())
    }

    fn checked(&self) -> Result<()> {
        self.validate()
            .map_err(|reason| StabilityError::invalid("config", reason))
    }

    /// Check the resolved subsample size against a dataset, so sizing
    /// errors surface before any task launches.
    fn check_against(&self, data: &dyn SampleSet) -> Result<()> {
        let rows = data.row_count();
        if rows == 0 {
            return Err(StabilityError::invalid("data", "dataset has no rows"));
        }

        let (size, with_replacement) = self.sample_style.resolve(rows);
        if size == 0 {
            return Err(StabilityError::invalid(
                "sample_style",
                "resolved subsample size is zero",
            ));
        }
        if !with_replacement && size > rows {
            return Err(StabilityError::invalid(
                "sample_style",
                format!("cannot draw {} distinct rows from {}", size, rows),
            ));
        }
        Ok(())
    }

    fn pool(&self) -> WorkerPool {
        WorkerPool::new(self.parallelism)
            .with_drain_budget(Duration::from_secs(self.drain_budget_secs))
    }
}

/// Outcome of a bootstrap graph aggregation.
#[derive(Debug)]
pub struct EnsembleOutcome {
    /// Consensus graph under the threshold policy.
    pub graph: StructureGraph,
    /// Frozen per-candidate frequencies.
    pub snapshot: FrequencySnapshot,
    /// Runs that completed successfully (the frequency denominator).
    pub succeeded: usize,
    /// Runs that failed and were excluded.
    pub failed: usize,
    /// Runs skipped or discarded due to cancellation.
    pub skipped: usize,
    bootstrap_graphs: Vec<StructureGraph>,
}

impl EnsembleOutcome {
    /// The per-run aligned graphs, for inspection only.
    pub fn bootstrap_graphs(&self) -> &[StructureGraph] {
        &self.bootstrap_graphs
    }
}

/// Plain bootstrap graph aggregation.
pub struct BootstrapEnsemble {
    config: EnsembleConfig,
}

impl BootstrapEnsemble {
    pub fn new(config: EnsembleConfig) -> Result<Self> {
        config.checked()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &EnsembleConfig {
        &self.config
    }

    /// Run the full ensemble to completion.
    pub fn run(&self, data: Arc<dyn SampleSet>, search: Arc<SearchFn>) -> Result<EnsembleOutcome> {
        self.run_cancellable(data, search, Arc::new(AtomicBool::new(false)))
    }

    /// Run with a cooperative cancellation flag (see [`WorkerPool`]).
    pub fn run_cancellable(
        &self,
        data: Arc<dyn SampleSet>,
        search: Arc<SearchFn>,
        cancel: Arc<AtomicBool>,
    ) -> Result<EnsembleOutcome> {
        self.config.check_against(&*data)?;

        let canonical = Arc::new(CanonicalVariables::from_names(data.variable_names()));
        let source = RandomSource::from_seed(self.config.seed);
        let table = Arc::new(FrequencyTable::new());
        let style = self.config.sample_style;

        let mut tasks: Vec<Task<StructureGraph>> =
            Vec::with_capacity(self.config.num_runs + usize::from(self.config.add_original));

        for _ in 0..self.config.num_runs {
            let data = Arc::clone(&data);
            let search = Arc::clone(&search);
            let canonical = Arc::clone(&canonical);
            let table = Arc::clone(&table);
            let source = Arc::clone(&source);

            tasks.push(Box::new(move || {
                let sample = Resampler::draw_styled(&*data, style, &source)?;
                let result = search(&*sample)?;
                let aligned = canonical.align(&result)?;
                table.record_graph(&aligned);
                Ok(aligned)
            }));
        }

        if self.config.add_original {
            let data = Arc::clone(&data);
            let search = Arc::clone(&search);
            let canonical = Arc::clone(&canonical);
            let table = Arc::clone(&table);

            tasks.push(Box::new(move || {
                let result = search(&*data)?;
                let aligned = canonical.align(&result)?;
                table.record_graph(&aligned);
                Ok(aligned)
            }));
        }

        let attempted = tasks.len();
        let pool = self.config.pool();
        info!(
            runs = attempted,
            workers = pool.workers(),
            "starting bootstrap ensemble"
        );

        let outcome = pool.run_cancellable(tasks, cancel)?;

        info!(
            succeeded = outcome.succeeded,
            failed = outcome.failed,
            skipped = outcome.skipped,
            "ensemble drained"
        );

        if outcome.succeeded == 0 {
            return Err(StabilityError::EmptyEnsemble { attempted });
        }

        let snapshot = table.snapshot(outcome.succeeded);
        let policy = ThresholdPolicy {
            threshold_fraction: self.config.threshold_fraction,
        };
        let graph = policy.select(&snapshot, canonical.names());

        Ok(EnsembleOutcome {
            graph,
            snapshot,
            succeeded: outcome.succeeded,
            failed: outcome.failed,
            skipped: outcome.skipped,
            bootstrap_graphs: outcome.results,
        })
    }
}

/// Configuration for target-relative ranked selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedConfig {
    pub ensemble: EnsembleConfig,
    /// Largest subset size swept.
    pub max_q: usize,
    /// Maximum tolerated expected-false-selection bound.
    pub target_error: f64,
}

impl RankedConfig {
    pub fn validate(&self) -> std::result::Result<(), String> {
        self.ensemble.validate()?;
        if self.max_q < 1 {
            return Err(format!("max_q must be >= 1, got {}", self.max_q));
        }
        if self.target_error <= 0.0 {
            return Err(format!(
                "target_error must be positive, got {}",
                self.target_error
            ));
        }
        Ok(())
    }
}

/// Outcome of a ranked aggregation.
#[derive(Debug)]
pub struct RankedOutcome {
    pub selection: SweepSelection,
    pub snapshot: RankedSnapshot,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Stability-ranked variable selection against a fixed target.
pub struct RankedEnsemble {
    config: RankedConfig,
}

impl RankedEnsemble {
    pub fn new(config: RankedConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|reason| StabilityError::invalid("config", reason))?;
        Ok(Self { config })
    }

    /// Run the ranked ensemble. `true_graph`, when supplied, only
    /// annotates output records with ancestor-of-target flags.
    pub fn run(
        &self,
        data: Arc<dyn SampleSet>,
        target: &str,
        rank: Arc<RankFn>,
        true_graph: Option<&StructureGraph>,
    ) -> Result<RankedOutcome> {
        self.run_cancellable(data, target, rank, true_graph, Arc::new(AtomicBool::new(false)))
    }

    pub fn run_cancellable(
        &self,
        data: Arc<dyn SampleSet>,
        target: &str,
        rank: Arc<RankFn>,
        true_graph: Option<&StructureGraph>,
        cancel: Arc<AtomicBool>,
    ) -> Result<RankedOutcome> {
        self.config.ensemble.check_against(&*data)?;

        let canonical = Arc::new(CanonicalVariables::from_names(data.variable_names()));
        if !canonical.contains(target) {
            return Err(StabilityError::MissingVariable {
                name: target.to_string(),
            });
        }

        // Candidates are every variable except the target
        let p = canonical.len() - 1;
        if p == 0 {
            return Err(StabilityError::invalid(
                "data",
                "no candidate variables besides the target",
            ));
        }

        let source = RandomSource::from_seed(self.config.ensemble.seed);
        let table = Arc::new(RankedFrequencyTable::new(self.config.max_q));
        let style = self.config.ensemble.sample_style;
        let target_owned = target.to_string();

        let mut tasks: Vec<Task<()>> = Vec::with_capacity(self.config.ensemble.num_runs);

        for _ in 0..self.config.ensemble.num_runs {
            let data = Arc::clone(&data);
            let rank = Arc::clone(&rank);
            let canonical = Arc::clone(&canonical);
            let table = Arc::clone(&table);
            let source = Arc::clone(&source);
            let target = target_owned.clone();

            tasks.push(Box::new(move || {
                let sample = Resampler::draw_styled(&*data, style, &source)?;
                let ranked = rank(&*sample, &target)?;
                // Every ranked name must reconcile against the canonical
                // set before it may be counted
                for (name, _) in &ranked {
                    canonical.require(name)?;
                }
                table.record_ranking(&ranked);
                Ok(())
            }));
        }

        if self.config.ensemble.add_original {
            let data = Arc::clone(&data);
            let rank = Arc::clone(&rank);
            let canonical = Arc::clone(&canonical);
            let table = Arc::clone(&table);
            let target = target_owned.clone();

            tasks.push(Box::new(move || {
                let ranked = rank(&*data, &target)?;
                for (name, _) in &ranked {
                    canonical.require(name)?;
                }
                table.record_ranking(&ranked);
                Ok(())
            }));
        }

        let attempted = tasks.len();
        info!(runs = attempted, target = %target, "starting ranked ensemble");

        let outcome = self.config.ensemble.pool().run_cancellable(tasks, cancel)?;

        if outcome.succeeded == 0 {
            return Err(StabilityError::EmptyEnsemble { attempted });
        }

        let snapshot = table.snapshot(outcome.succeeded);
        let policy = SweepPolicy {
            max_q: self.config.max_q,
            target_error: self.config.target_error,
        };
        let selection = policy.select(&snapshot, p, target, true_graph);

        info!(
            succeeded = outcome.succeeded,
            failed = outcome.failed,
            q = selection.q,
            selected = selection.records.len(),
            "ranked ensemble complete"
        );

        Ok(RankedOutcome {
            selection,
            snapshot,
            succeeded: outcome.succeeded,
            failed: outcome.failed,
            skipped: outcome.skipped,
        })
    }
}
