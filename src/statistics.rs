//! Shared numeric helpers
//!
//! Wraps trueno's SIMD vector primitives and aprender's descriptive
//! statistics behind the two operations the aggregation layer needs:
//! means (effect averaging, instability statistics) and medians (record
//! combination across repeated sweeps).

use anyhow::Result;
use aprender::stats::DescriptiveStats;
use trueno::Vector;

/// SIMD-accelerated mean. Empty input yields 0.0.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let v32: Vec<f32> = values.iter().map(|&x| x as f32).collect();
    Vector::from_slice(&v32).mean().unwrap_or(0.0) as f64
}

/// Median via aprender's quantile(0.5) (R-7 method).
///
/// Median is more robust to outliers than mean, which matters when
/// combining effect estimates across repeated sweeps.
pub fn median(values: &[f64]) -> Result<f64> {
    if values.is_empty() {
        anyhow::bail!("cannot take the median of an empty slice");
    }
    let v32: Vec<f32> = values.iter().map(|&x| x as f32).collect();
    let vector = Vector::from_slice(&v32);
    let stats = DescriptiveStats::new(&vector);
    stats
        .quantile(0.5)
        .map(|m| m as f64)
        .map_err(|e| anyhow::anyhow!("failed to compute median: {}", e))
}
