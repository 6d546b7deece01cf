//! Labeled count and significance tables.
//!
//! A [`LabeledTable`] pairs an `ndarray` matrix with row labels (features/clones) and
//! column labels (samples). The model never reorders or drops rows or columns, so the
//! labels of a count table flow unchanged into the significance table computed from it.

use ndarray::{Array2, ArrayView1};
use single_utilities::traits::FloatOps;

use crate::error::GammaPoissonError;

pub mod utils;

/// A 2-D table with row and column labels.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledTable<T> {
    /// Cell values, rows × columns
    pub values: Array2<T>,
    /// One label per row
    pub row_labels: Vec<String>,
    /// One label per column
    pub col_labels: Vec<String>,
}

/// Table of non-negative read counts (rows = features, columns = samples).
pub type CountTable<T> = LabeledTable<T>;

/// Table of `-log10(p)` values, same shape and labels as the counts it came from.
pub type SignificanceTable = LabeledTable<f64>;

impl<T> LabeledTable<T> {
    /// Create a table, checking that the labels match the matrix shape.
    pub fn new(
        values: Array2<T>,
        row_labels: Vec<String>,
        col_labels: Vec<String>,
    ) -> anyhow::Result<Self> {
        let (nrows, ncols) = values.dim();
        if row_labels.len() != nrows {
            return Err(GammaPoissonError::invalid(format!(
                "expected {} row labels, got {}",
                nrows,
                row_labels.len()
            )));
        }
        if col_labels.len() != ncols {
            return Err(GammaPoissonError::invalid(format!(
                "expected {} column labels, got {}",
                ncols,
                col_labels.len()
            )));
        }
        Ok(LabeledTable {
            values,
            row_labels,
            col_labels,
        })
    }

    /// Create a table with positional labels ("0", "1", ...).
    pub fn from_array(values: Array2<T>) -> Self {
        let (nrows, ncols) = values.dim();
        LabeledTable {
            values,
            row_labels: (0..nrows).map(|i| i.to_string()).collect(),
            col_labels: (0..ncols).map(|j| j.to_string()).collect(),
        }
    }

    /// Build a new table with the same labels around different values.
    pub(crate) fn with_values<U>(&self, values: Array2<U>) -> LabeledTable<U> {
        debug_assert_eq!(values.dim(), self.values.dim());
        LabeledTable {
            values,
            row_labels: self.row_labels.clone(),
            col_labels: self.col_labels.clone(),
        }
    }

    pub fn nrows(&self) -> usize {
        self.values.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.values.ncols()
    }

    pub fn shape(&self) -> (usize, usize) {
        self.values.dim()
    }

    /// Values of a row looked up by label.
    pub fn row_by_label(&self, label: &str) -> Option<ArrayView1<'_, T>> {
        self.row_labels
            .iter()
            .position(|l| l == label)
            .map(|i| self.values.row(i))
    }
}

impl<T> LabeledTable<T>
where
    T: FloatOps,
{
    /// Convert to `f64`, rejecting negative, non-finite or non-numeric cells.
    pub fn to_f64_counts(&self) -> anyhow::Result<Array2<f64>> {
        utils::validated_counts(&self.values)
    }
}

impl SignificanceTable {
    /// Cells whose `-log10(p)` exceeds `threshold`, as `(row, col)` index pairs in row-major order.
    ///
    /// No multiple-testing adjustment is applied.
    pub fn cells_above(&self, threshold: f64) -> Vec<(usize, usize)> {
        self.values
            .indexed_iter()
            .filter_map(|((i, j), &v)| if v > threshold { Some((i, j)) } else { None })
            .collect()
    }
}
