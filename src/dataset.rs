//! Dataset boundary for resampling
//!
//! The aggregation core never interprets data values; it only needs row
//! and column counts, variable names, and the ability to derive an owned
//! sub-dataset from a row index subset. Callers with their own data layer
//! implement [`SampleSet`]; [`TabularData`] is the concrete implementation
//! used by tests and small callers.

use crate::error::{Result, StabilityError};
use std::sync::Arc;

/// Minimal dataset interface consumed by the resampler and the injected
/// structure-discovery procedure.
///
/// Implementations must be cheap to share across worker threads; the
/// resampler hands each bootstrap task an `Arc<dyn SampleSet>` that the
/// task owns exclusively until it completes.
pub trait SampleSet: Send + Sync {
    /// Number of rows (observations).
    fn row_count(&self) -> usize;

    /// Number of columns (variables).
    fn column_count(&self) -> usize;

    /// Variable names, in column order. Names are unique within a dataset.
    fn variable_names(&self) -> &[String];

    /// Cell value at (row, column).
    fn value(&self, row: usize, col: usize) -> f64;

    /// Produce an owned sub-dataset containing exactly the given rows, in
    /// the given order (duplicates allowed for with-replacement draws).
    fn row_subset(&self, rows: &[usize]) -> Arc<dyn SampleSet>;
}

/// Row-major in-memory dataset
#[derive(Debug, Clone)]
pub struct TabularData {
    variables: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl TabularData {
    /// Create a dataset from variable names and row-major data.
    ///
    /// Fails if rows are ragged or variable names are not unique.
    pub fn new(variables: Vec<String>, rows: Vec<Vec<f64>>) -> Result<Self> {
        let cols = variables.len();

        for (i, row) in rows.iter().enumerate() {
            if row.len() != cols {
                return Err(StabilityError::invalid(
                    "rows",
                    format!("row {} has {} values, expected {}", i, row.len(), cols),
                ));
            }
        }

        for (i, name) in variables.iter().enumerate() {
            if variables[..i].contains(name) {
                return Err(StabilityError::invalid(
                    "variables",
                    format!("duplicate variable name '{}'", name),
                ));
            }
        }

        Ok(Self { variables, rows })
    }

    /// Convenience constructor with generated names `V1..Vn`.
    pub fn with_generated_names(rows: Vec<Vec<f64>>) -> Result<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        let variables = (1..=cols).map(|i| format!("V{}", i)).collect();
        Self::new(variables, rows)
    }
}

impl SampleSet for TabularData {
    fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn column_count(&self) -> usize {
        self.variables.len()
    }

    fn variable_names(&self) -> &[String] {
        &self.variables
    }

    fn value(&self, row: usize, col: usize) -> f64 {
        self.rows[row][col]
    }

    fn row_subset(&self, rows: &[usize]) -> Arc<dyn SampleSet> {
        let subset: Vec<Vec<f64>> = rows.iter().map(|&r| self.rows[r].clone()).collect();
        Arc::new(Self {
            variables: self.variables.clone(),
            rows: subset,
        })
    }
}
