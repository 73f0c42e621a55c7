//! Selection-frequency aggregation
//!
//! The one piece of state mutated by concurrent tasks. Increments are
//! atomic per candidate (no lost updates), order-independent, and
//! append-only while the ensemble is draining; a snapshot freezes counts
//! into an immutable table with frequencies over the *effective* run
//! count: the number of runs that actually succeeded, never the number
//! submitted.
//!
//! Two counting modes:
//! - Edge mode: each aligned run result contributes one increment per
//!   distinct unordered pair, with per-orientation sub-counts so the
//!   threshold policy can emit the winning orientation.
//! - Ranked mode: a run's ordered candidate list contributes to every
//!   prefix length `q >= rank`, producing a separate table per subset
//!   size.

use crate::graph::{EdgeKey, Orientation, StructureGraph};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Default, Clone)]
struct EdgeCount {
    total: u64,
    undirected: u64,
    forward: u64,
    backward: u64,
}

/// Concurrent edge-candidate counter.
#[derive(Debug, Default)]
pub struct FrequencyTable {
    counts: Mutex<HashMap<EdgeKey, EdgeCount>>,
}

/// Immutable view of one candidate after aggregation.
#[derive(Debug, Clone, Serialize)]
pub struct FrequencyEntry {
    pub key: EdgeKey,
    pub count: u64,
    /// count / effective_runs, in [0, 1].
    pub frequency: f64,
    /// Orientation sub-counts: (undirected, forward, backward).
    pub orientation_counts: (u64, u64, u64),
}

impl FrequencyEntry {
    /// The orientation observed most often for this pair. Undirected
    /// wins ties, matching the conservative preference of the original
    /// edge-ensemble resolution.
    pub fn winning_orientation(&self) -> Orientation {
        let (u, f, b) = self.orientation_counts;
        if f > u && f >= b {
            Orientation::Forward
        } else if b > u && b > f {
            Orientation::Backward
        } else {
            Orientation::Undirected
        }
    }
}

/// Frozen aggregation result.
#[derive(Debug, Clone, Serialize)]
pub struct FrequencySnapshot {
    pub entries: Vec<FrequencyEntry>,
    pub effective_runs: usize,
}

impl FrequencySnapshot {
    pub fn frequency_of(&self, key: &EdgeKey) -> f64 {
        self.entries
            .iter()
            .find(|e| &e.key == key)
            .map_or(0.0, |e| e.frequency)
    }
}

impl FrequencyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one increment for a candidate with the orientation a run
    /// assigned to it. Atomic per candidate.
    pub fn increment(&self, key: EdgeKey, orientation: Orientation) {
        let mut counts = self.counts.lock().expect("frequency table poisoned");
        let entry = counts.entry(key).or_default();
        entry.total += 1;
        match orientation {
            Orientation::Undirected => entry.undirected += 1,
            Orientation::Forward => entry.forward += 1,
            Orientation::Backward => entry.backward += 1,
        }
    }

    /// Record every distinct unordered pair of an aligned run result.
    /// A pair appearing twice in one graph still counts once.
    pub fn record_graph(&self, aligned: &StructureGraph) {
        for edge in aligned.distinct_pairs() {
            self.increment(edge.key, edge.orientation);
        }
    }

    /// Freeze counts into an immutable snapshot. `effective_runs` is the
    /// number of successful runs, which bounds every count.
    pub fn snapshot(&self, effective_runs: usize) -> FrequencySnapshot {
        let counts = self.counts.lock().expect("frequency table poisoned");
        let mut entries: Vec<FrequencyEntry> = counts
            .iter()
            .map(|(key, c)| FrequencyEntry {
                key: key.clone(),
                count: c.total,
                frequency: if effective_runs == 0 {
                    0.0
                } else {
                    c.total as f64 / effective_runs as f64
                },
                orientation_counts: (c.undirected, c.forward, c.backward),
            })
            .collect();
        entries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));
        FrequencySnapshot {
            entries,
            effective_runs,
        }
    }
}

/// Per-subset-size counts for target-relative ranked selection.
///
/// A run produces an ordered candidate list by estimated effect
/// magnitude; the variable ranked r-th (1-based) contributes to the
/// count at every subset size q >= r. Effect magnitudes are retained so
/// the selection policy can report per-variable averages.
#[derive(Debug)]
pub struct RankedFrequencyTable {
    max_q: usize,
    inner: Mutex<RankedInner>,
}

#[derive(Debug, Default)]
struct RankedInner {
    /// variable -> counts indexed by q-1
    counts: HashMap<String, Vec<u64>>,
    /// variable -> observed effect magnitudes, one per contributing run
    effects: HashMap<String, Vec<f64>>,
}

/// Frozen ranked-mode aggregation.
#[derive(Debug, Clone, Serialize)]
pub struct RankedSnapshot {
    pub max_q: usize,
    pub effective_runs: usize,
    /// variable -> counts indexed by q-1
    pub counts: HashMap<String, Vec<u64>>,
    /// variable -> mean effect magnitude inputs
    pub effects: HashMap<String, Vec<f64>>,
}

impl RankedSnapshot {
    /// Selection frequency of `variable` at subset size `q` (1-based).
    pub fn pi(&self, variable: &str, q: usize) -> f64 {
        if self.effective_runs == 0 || q == 0 || q > self.max_q {
            return 0.0;
        }
        self.counts
            .get(variable)
            .map_or(0.0, |c| c[q - 1] as f64 / self.effective_runs as f64)
    }
}

impl RankedFrequencyTable {
    pub fn new(max_q: usize) -> Self {
        Self {
            max_q,
            inner: Mutex::new(RankedInner::default()),
        }
    }

    pub fn max_q(&self) -> usize {
        self.max_q
    }

    /// Record one run's ordered candidate list (best first). Entries
    /// past `max_q` still record their effect magnitude but contribute
    /// to no prefix count.
    pub fn record_ranking(&self, ranked: &[(String, f64)]) {
        let mut inner = self.inner.lock().expect("ranked table poisoned");

        for (rank0, (variable, effect)) in ranked.iter().enumerate() {
            let counts = inner
                .counts
                .entry(variable.clone())
                .or_insert_with(|| vec![0; self.max_q]);
            for q in rank0..self.max_q {
                counts[q] += 1;
            }
            inner
                .effects
                .entry(variable.clone())
                .or_default()
                .push(*effect);
        }
    }

    pub fn snapshot(&self, effective_runs: usize) -> RankedSnapshot {
        let inner = self.inner.lock().expect("ranked table poisoned");
        RankedSnapshot {
            max_q: self.max_q,
            effective_runs,
            counts: inner.counts.clone(),
            effects: inner.effects.clone(),
        }
    }
}
