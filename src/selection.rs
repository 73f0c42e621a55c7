//! Selection policies
//!
//! Turns frequency snapshots into final answers. Threshold mode keeps
//! every edge whose selection frequency clears a strict majority-style
//! cutoff and emits a consensus graph. Sweep mode scans subset sizes
//! q = 1..max_q, bounds the expected false selections at each q, and
//! keeps the q that accepts the most variables: the stability-ranking
//! construction of Stekhoven et al. (2012), "Causal stability ranking",
//! Bioinformatics 28(21).

use crate::bounds::{expected_false_selections, pcer_squared};
use crate::frequency::{FrequencySnapshot, RankedSnapshot};
use crate::graph::{Orientation, StructureGraph};
use crate::statistics;
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

/// Threshold-mode policy for plain bootstrap graph aggregation.
#[derive(Debug, Clone, Copy)]
pub struct ThresholdPolicy {
    /// Fraction of effective runs a candidate must exceed (strictly) to
    /// be included, e.g. 0.5.
    pub threshold_fraction: f64,
}

impl ThresholdPolicy {
    /// Build the consensus graph: candidate included iff
    /// `count > threshold_fraction · effective_runs`, with each accepted
    /// pair carrying its most-frequent orientation.
    pub fn select(&self, snapshot: &FrequencySnapshot, variables: &[String]) -> StructureGraph {
        let mut graph = StructureGraph::new(variables.to_vec());
        let cutoff = self.threshold_fraction * snapshot.effective_runs as f64;

        for entry in &snapshot.entries {
            if entry.count as f64 > cutoff {
                match entry.winning_orientation() {
                    Orientation::Undirected => {
                        graph.add_undirected(entry.key.first(), entry.key.second())
                    }
                    Orientation::Forward => {
                        graph.add_directed(entry.key.first(), entry.key.second())
                    }
                    Orientation::Backward => {
                        graph.add_directed(entry.key.second(), entry.key.first())
                    }
                }
            }
        }

        graph
    }
}

/// One selected variable with its stability diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct SelectionRecord {
    pub variable: String,
    /// Selection frequency at the winning subset size.
    pub pi: f64,
    /// Mean estimated effect magnitude across contributing runs.
    pub avg_effect: f64,
    /// Per-comparison error rate (squared-ratio diagnostic variant).
    pub pcer: f64,
    /// Expected false selections at the winning subset size.
    pub expected_false_selections: f64,
    /// Subset size this record was accepted at.
    pub q: usize,
    /// Total candidate count.
    pub p: usize,
    /// Evaluation-only: is this variable a true ancestor of the target?
    /// `None` when no ground-truth graph was supplied. Never used in the
    /// selection decision.
    pub ancestor: Option<bool>,
}

/// Output of a sweep-mode selection.
#[derive(Debug, Clone, Serialize)]
pub struct SweepSelection {
    /// The winning subset size.
    pub q: usize,
    /// Accepted variables at the winning q, best first.
    pub records: Vec<SelectionRecord>,
    /// Size of the accepted set at every q (index q-1), for diagnostics.
    pub accepted_per_q: Vec<usize>,
}

/// Sweep-mode policy for stability-ranked variable selection.
#[derive(Debug, Clone, Copy)]
pub struct SweepPolicy {
    pub max_q: usize,
    /// Maximum tolerated expected-false-selection bound.
    pub target_error: f64,
}

impl SweepPolicy {
    /// Scan q = 1..=max_q, accept variables whose bound stays within the
    /// target, and keep the q with the largest accepted set (ties go to
    /// the smallest q). The optional `true_graph` only annotates records
    /// with ancestor-of-target flags.
    pub fn select(
        &self,
        snapshot: &RankedSnapshot,
        p: usize,
        target: &str,
        true_graph: Option<&StructureGraph>,
    ) -> SweepSelection {
        let mut accepted_per_q = Vec::with_capacity(self.max_q);
        let mut best_q = 1usize;
        let mut best: Vec<String> = Vec::new();

        for q in 1..=self.max_q {
            let mut accepted: Vec<String> = snapshot
                .counts
                .keys()
                .filter(|var| {
                    let pi = snapshot.pi(var, q);
                    expected_false_selections(pi, q as f64, p as f64) <= self.target_error
                })
                .cloned()
                .collect();
            accepted.sort();

            debug!(q, accepted = accepted.len(), "sweep step");
            accepted_per_q.push(accepted.len());

            // Strict improvement only: first q reaching the maximum wins
            if accepted.len() > best.len() {
                best_q = q;
                best = accepted;
            }
        }

        let mut records: Vec<SelectionRecord> = best
            .into_iter()
            .map(|variable| {
                let pi = snapshot.pi(&variable, best_q);
                let effects = snapshot
                    .effects
                    .get(&variable)
                    .map_or(&[] as &[f64], Vec::as_slice);
                SelectionRecord {
                    pi,
                    avg_effect: statistics::mean(effects),
                    pcer: pcer_squared(pi, best_q as f64, p as f64),
                    expected_false_selections: expected_false_selections(
                        pi,
                        best_q as f64,
                        p as f64,
                    ),
                    q: best_q,
                    p,
                    ancestor: true_graph.map(|g| g.is_ancestor_of(&variable, target)),
                    variable,
                }
            })
            .collect();

        sort_records(&mut records);

        SweepSelection {
            q: best_q,
            records,
            accepted_per_q,
        }
    }
}

/// Sort records by frequency, then effect, both descending.
fn sort_records(records: &mut [SelectionRecord]) {
    records.sort_by(|a, b| {
        b.pi.partial_cmp(&a.pi)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                b.avg_effect
                    .partial_cmp(&a.avg_effect)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    });
}

/// Combine record lists from repeated sweeps into one consensus list:
/// per variable, the median frequency and median effect across lists,
/// with bounds recomputed at the combined frequency. Sorted by
/// frequency, then effect.
pub fn combine_records(runs: &[Vec<SelectionRecord>]) -> anyhow::Result<Vec<SelectionRecord>> {
    let mut grouped: HashMap<String, Vec<&SelectionRecord>> = HashMap::new();

    for run in runs {
        for record in run {
            grouped.entry(record.variable.clone()).or_default().push(record);
        }
    }

    let mut combined = Vec::with_capacity(grouped.len());

    for (variable, records) in grouped {
        let pis: Vec<f64> = records.iter().map(|r| r.pi).collect();
        let effects: Vec<f64> = records.iter().map(|r| r.avg_effect).collect();

        let pi = statistics::median(&pis)?;
        let avg_effect = statistics::median(&effects)?;
        let q = records[0].q;
        let p = records[0].p;

        combined.push(SelectionRecord {
            variable,
            pi,
            avg_effect,
            pcer: pcer_squared(pi, q as f64, p as f64),
            expected_false_selections: expected_false_selections(pi, q as f64, p as f64),
            q,
            p,
            ancestor: records[0].ancestor,
        });
    }

    sort_records(&mut combined);
    Ok(combined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frequency::{FrequencyTable, RankedFrequencyTable};
    use crate::graph::EdgeKey;

    #[test]
    fn test_threshold_strict_majority() {
        let table = FrequencyTable::new();
        let key = EdgeKey::new("A", "B");
        for _ in 0..5 {
            table.increment(key.clone(), Orientation::Undirected);
        }
        let weak = EdgeKey::new("B", "C");
        for _ in 0..5 {
            table.increment(weak.clone(), Orientation::Undirected);
        }

        // 10 runs: A--B at 5/10 = exactly the cutoff, excluded (strict)
        let snap = table.snapshot(10);
        let policy = ThresholdPolicy {
            threshold_fraction: 0.5,
        };
        let graph = policy.select(
            &snap,
            &["A".to_string(), "B".to_string(), "C".to_string()],
        );
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_threshold_includes_majority_edges() {
        let table = FrequencyTable::new();
        for _ in 0..8 {
            table.increment(EdgeKey::new("A", "B"), Orientation::Forward);
        }
        for _ in 0..2 {
            table.increment(EdgeKey::new("B", "C"), Orientation::Undirected);
        }

        let snap = table.snapshot(10);
        let policy = ThresholdPolicy {
            threshold_fraction: 0.5,
        };
        let graph = policy.select(
            &snap,
            &["A".to_string(), "B".to_string(), "C".to_string()],
        );

        assert_eq!(graph.edge_count(), 1);
        assert!(graph.is_adjacent("A", "B"));
        assert!(graph.is_ancestor_of("A", "B")); // Forward orientation kept
    }

    fn ranked_snapshot() -> RankedSnapshot {
        // 4 runs over candidates {A, B, C, D}
        let table = RankedFrequencyTable::new(3);
        table.record_ranking(&[
            ("A".to_string(), 0.9),
            ("B".to_string(), 0.5),
            ("C".to_string(), 0.2),
        ]);
        table.record_ranking(&[
            ("A".to_string(), 0.8),
            ("B".to_string(), 0.6),
            ("C".to_string(), 0.3),
        ]);
        table.record_ranking(&[
            ("A".to_string(), 0.7),
            ("C".to_string(), 0.4),
            ("B".to_string(), 0.2),
        ]);
        table.record_ranking(&[
            ("A".to_string(), 0.9),
            ("B".to_string(), 0.4),
            ("D".to_string(), 0.1),
        ]);
        table.snapshot(4)
    }

    #[test]
    fn test_sweep_picks_largest_accepted_set() {
        let snap = ranked_snapshot();
        // π(A, q=1) = 1.0; π at larger q admits B and C as well
        let policy = SweepPolicy {
            max_q: 3,
            target_error: 2.0,
        };
        let selection = policy.select(&snap, 4, "T", None);

        assert_eq!(selection.accepted_per_q.len(), 3);
        // Accepted set sizes never shrink the winner below the best q
        let max = *selection.accepted_per_q.iter().max().unwrap();
        assert_eq!(
            selection.accepted_per_q[selection.q - 1],
            max,
            "winner must carry the maximum accepted count"
        );
        // Records are sorted best-first
        if selection.records.len() > 1 {
            assert!(selection.records[0].pi >= selection.records[1].pi);
        }
    }

    #[test]
    fn test_sweep_tie_prefers_smallest_q() {
        // One variable always ranked first: accepted at every q with a
        // permissive bound, so all q tie and q = 1 must win.
        let table = RankedFrequencyTable::new(3);
        for _ in 0..4 {
            table.record_ranking(&[("A".to_string(), 1.0)]);
        }
        let snap = table.snapshot(4);

        let policy = SweepPolicy {
            max_q: 3,
            target_error: 3.0,
        };
        let selection = policy.select(&snap, 4, "T", None);
        assert_eq!(selection.q, 1);
    }

    #[test]
    fn test_sweep_pi_half_excluded_regardless_of_cutoff() {
        // Counts at q=1: A:2 of 4 → π = 0.5 → sentinel bound → excluded
        let table = RankedFrequencyTable::new(1);
        table.record_ranking(&[("A".to_string(), 1.0)]);
        table.record_ranking(&[("A".to_string(), 1.0)]);
        table.record_ranking(&[("B".to_string(), 1.0)]);
        table.record_ranking(&[("D".to_string(), 0.0)]);
        let snap = table.snapshot(4);

        let policy = SweepPolicy {
            max_q: 1,
            target_error: f64::MAX,
        };
        let selection = policy.select(&snap, 4, "T", None);
        assert!(selection.records.iter().all(|r| r.variable != "A"));
    }

    #[test]
    fn test_sweep_ancestor_annotation() {
        let mut truth = StructureGraph::new(vec![
            "A".to_string(),
            "B".to_string(),
            "T".to_string(),
        ]);
        truth.add_directed("A", "T");

        let table = RankedFrequencyTable::new(1);
        for _ in 0..4 {
            table.record_ranking(&[("A".to_string(), 0.9), ("B".to_string(), 0.5)]);
        }
        let snap = table.snapshot(4);

        let policy = SweepPolicy {
            max_q: 1,
            target_error: 2.0,
        };
        let selection = policy.select(&snap, 2, "T", Some(&truth));

        let a = selection
            .records
            .iter()
            .find(|r| r.variable == "A")
            .unwrap();
        assert_eq!(a.ancestor, Some(true));
    }

    #[test]
    fn test_sweep_without_truth_has_no_annotation() {
        let table = RankedFrequencyTable::new(1);
        for _ in 0..2 {
            table.record_ranking(&[("A".to_string(), 0.9)]);
        }
        let snap = table.snapshot(2);
        let policy = SweepPolicy {
            max_q: 1,
            target_error: 2.0,
        };
        let selection = policy.select(&snap, 3, "T", None);
        assert!(selection.records.iter().all(|r| r.ancestor.is_none()));
    }

    fn record(variable: &str, pi: f64, effect: f64) -> SelectionRecord {
        SelectionRecord {
            variable: variable.to_string(),
            pi,
            avg_effect: effect,
            pcer: 0.0,
            expected_false_selections: 0.0,
            q: 2,
            p: 10,
            ancestor: None,
        }
    }

    #[test]
    fn test_combine_records_medians() {
        let runs = vec![
            vec![record("A", 0.9, 1.0), record("B", 0.6, 0.5)],
            vec![record("A", 0.7, 3.0), record("B", 0.8, 0.7)],
            vec![record("A", 0.8, 2.0)],
        ];

        let combined = combine_records(&runs).unwrap();
        let a = combined.iter().find(|r| r.variable == "A").unwrap();
        assert!((a.pi - 0.8).abs() < 1e-6);
        assert!((a.avg_effect - 2.0).abs() < 1e-6);
        // Bounds recomputed at the combined frequency
        assert!(a.expected_false_selections.is_finite());
    }

    #[test]
    fn test_combine_records_sorted_by_pi_then_effect() {
        let runs = vec![vec![
            record("A", 0.7, 1.0),
            record("B", 0.9, 0.2),
            record("C", 0.7, 2.0),
        ]];

        let combined = combine_records(&runs).unwrap();
        let order: Vec<&str> = combined.iter().map(|r| r.variable.as_str()).collect();
        assert_eq!(order, vec!["B", "C", "A"]);
    }

    #[test]
    fn test_combine_records_empty() {
        let combined = combine_records(&[]).unwrap();
        assert!(combined.is_empty());
    }
}
