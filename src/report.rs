//! Diagnostic rendering of selection records
//!
//! Produces the fixed-width text table reviewers read and a JSON export
//! for tooling. Cells whose frequency is at or below 0.5 print `*` in
//! the bound columns: the bounds are undefined there and the sentinel
//! would only mislead.

use crate::selection::{SelectionRecord, SweepSelection};
use serde::Serialize;

#[derive(Serialize)]
struct SweepReport<'a> {
    q: usize,
    accepted_per_q: &'a [usize],
    records: &'a [SelectionRecord],
}

/// Render a sweep selection as JSON.
pub fn to_json(selection: &SweepSelection) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&SweepReport {
        q: selection.q,
        accepted_per_q: &selection.accepted_per_q,
        records: &selection.records,
    })
}

fn bound_cell(pi: f64, value: f64) -> String {
    if pi <= 0.5 {
        "*".to_string()
    } else {
        format!("{:.4}", value)
    }
}

/// Render selection records as a fixed-width text table.
///
/// When any record carries an ancestor annotation an `A` column is
/// added; `A` marks true ancestors of the target (evaluation only).
pub fn render_table(records: &[SelectionRecord]) -> String {
    if records.is_empty() {
        return "\nThere are no records above chance.\n".to_string();
    }

    let with_ancestor = records.iter().any(|r| r.ancestor.is_some());
    let name_width = records
        .iter()
        .map(|r| r.variable.len())
        .max()
        .unwrap_or(8)
        .max("Variable".len());

    let mut out = String::new();
    out.push('\n');
    out.push_str(&format!(
        "{:>5}  {:<name_width$}  {:>7}  {:>9}  {:>7}  {:>7}",
        "Index", "Variable", "PI", "Effect", "E(V)", "PCER"
    ));
    if with_ancestor {
        out.push_str("  A");
    }
    out.push('\n');

    for (i, record) in records.iter().enumerate() {
        out.push_str(&format!(
            "{:>5}  {:<name_width$}  {:>7.4}  {:>9.4}  {:>7}  {:>7}",
            i + 1,
            record.variable,
            record.pi,
            record.avg_effect,
            bound_cell(record.pi, record.expected_false_selections),
            bound_cell(record.pi, record.pcer),
        ));
        if with_ancestor {
            out.push_str(if record.ancestor == Some(true) {
                "  A"
            } else {
                "   "
            });
        }
        out.push('\n');
    }

    let last = &records[records.len() - 1];
    out.push_str(&format!("p = {} q = {}\n", last.p, last.q));
    out
}
