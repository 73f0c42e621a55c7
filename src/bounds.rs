//! Stability-selection error bounds
//!
//! Per-comparison error rate (PCER) and expected-false-selection bounds
//! for a candidate selected with frequency π out of a candidate set of
//! size p at subset size q, after:
//!
//! Meinshausen, N., and Bühlmann, P. (2010). Stability selection.
//! Journal of the Royal Statistical Society: Series B, 72(4), 417-473.
//!
//! Two PCER variants are deliberately kept side by side: the linear
//! `q/p` form used by the expected-false-selection bound, and the
//! squared `(q/p)²` form used as the per-comparison diagnostic in the
//! ranked report. Published implementations of the bound disagree on
//! which is correct; both are provided under their own names rather than
//! silently unified.
//!
//! All functions are pure and total: out-of-domain input (π ≤ 0.5, or a
//! value outside its valid range) yields `f64::INFINITY` as an
//! "unusable" sentinel instead of an error, so `value <= threshold`
//! comparisons naturally reject it downstream.

/// Per-comparison error rate, linear form: `(1/(2π−1)) · (q/p)`.
///
/// Defined only for π > 0.5; returns the infinity sentinel otherwise.
pub fn pcer(pi: f64, q: f64, p: f64) -> f64 {
    if pi <= 0.5 {
        return f64::INFINITY;
    }
    (1.0 / (2.0 * pi - 1.0)) * (q / p)
}

/// Expected number of false selections at subset size q: `q · pcer`.
///
/// Returns the sentinel when the underlying pcer is the sentinel, or
/// when the computed value leaves the valid range [0, q], the regime
/// where the bound's assumptions have broken down numerically.
pub fn expected_false_selections(pi: f64, q: f64, p: f64) -> f64 {
    let rate = pcer(pi, q, p);
    if !rate.is_finite() {
        return f64::INFINITY;
    }
    let v = q * rate;
    if v < 0.0 || v > q {
        return f64::INFINITY;
    }
    v
}

/// Per-comparison error rate, squared form: `(q/p)² / (2π−1)`.
///
/// The variant used by the per-comparison column of the ranked report.
/// Same domain restriction as [`pcer`].
pub fn pcer_squared(pi: f64, q: f64, p: f64) -> f64 {
    if pi <= 0.5 {
        return f64::INFINITY;
    }
    let ratio = q / p;
    (ratio * ratio) / (2.0 * pi - 1.0)
}
