use ndarray::{Array1, Array2, Axis, Zip};
use num_traits::ToPrimitive;
use single_utilities::traits::FloatOps;
use std::cmp::Ordering;

use crate::error::GammaPoissonError;

/// Convert a count matrix to `f64`, checking every cell is finite and non-negative.
pub fn validated_counts<T>(values: &Array2<T>) -> anyhow::Result<Array2<f64>>
where
    T: FloatOps,
{
    let mut out = Array2::<f64>::zeros(values.dim());
    for ((i, j), v) in values.indexed_iter() {
        let x = ToPrimitive::to_f64(v).ok_or_else(|| {
            GammaPoissonError::invalid(format!("non-numeric count at ({}, {})", i, j))
        })?;
        if !x.is_finite() || x < 0.0 {
            return Err(GammaPoissonError::invalid(format!(
                "count at ({}, {}) must be finite and non-negative, got {}",
                i, j, x
            )));
        }
        out[[i, j]] = x;
    }
    Ok(out)
}

/// Score at the given percentile of all values, interpolating linearly between
/// order statistics (position `percentile / 100 * (n - 1)` in the sorted data).
pub fn score_at_percentile(values: &Array2<f64>, percentile: f64) -> anyhow::Result<f64> {
    if !(0.0..=100.0).contains(&percentile) {
        return Err(GammaPoissonError::invalid(format!(
            "percentile must be within [0, 100], got {}",
            percentile
        )));
    }
    if values.is_empty() {
        return Err(GammaPoissonError::invalid(
            "cannot compute a percentile of an empty table",
        ));
    }

    let mut sorted: Vec<f64> = values.iter().copied().collect();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

    let position = percentile / 100.0 * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let fraction = position - lower as f64;
    if fraction == 0.0 || lower + 1 >= sorted.len() {
        return Ok(sorted[lower]);
    }
    Ok(sorted[lower] + (sorted[lower + 1] - sorted[lower]) * fraction)
}

/// Per-cell validity flags for a count table trimmed at an upper bound.
///
/// A cell is valid when its value is `<= upper_bound`. Masked cells stay in the
/// table; they are only left out of row sums, counts and means.
#[derive(Debug, Clone, PartialEq)]
pub struct TrimMask {
    pub valid: Array2<bool>,
    pub upper_bound: f64,
}

impl TrimMask {
    /// Mask every cell strictly greater than `upper_bound`.
    pub fn mask_greater(values: &Array2<f64>, upper_bound: f64) -> Self {
        TrimMask {
            valid: values.mapv(|v| v <= upper_bound),
            upper_bound,
        }
    }

    pub fn n_masked(&self) -> usize {
        self.valid.iter().filter(|&&ok| !ok).count()
    }

    /// Sum of unmasked values in each row.
    pub fn row_sums(&self, values: &Array2<f64>) -> Array1<f64> {
        let mut sums = Array1::<f64>::zeros(values.nrows());
        Zip::from(&mut sums)
            .and(values.rows())
            .and(self.valid.rows())
            .for_each(|sum, row, valid| {
                *sum = row
                    .iter()
                    .zip(valid.iter())
                    .filter(|&(_, &ok)| ok)
                    .map(|(&v, _)| v)
                    .sum();
            });
        sums
    }

    /// Number of unmasked cells in each row.
    pub fn row_counts(&self) -> Array1<usize> {
        self.valid
            .axis_iter(Axis(0))
            .map(|row| row.iter().filter(|&&ok| ok).count())
            .collect()
    }

    /// Mean of the unmasked values in each row; rows with nothing left are 0.
    pub fn row_means(&self, values: &Array2<f64>) -> Array1<f64> {
        let sums = self.row_sums(values);
        let counts = self.row_counts();
        Zip::from(&sums)
            .and(&counts)
            .map_collect(|&s, &n| if n == 0 { 0.0 } else { s / n as f64 })
    }

    /// Indices of rows in which every cell is masked.
    pub fn fully_masked_rows(&self) -> Vec<usize> {
        self.row_counts()
            .iter()
            .enumerate()
            .filter_map(|(i, &n)| if n == 0 { Some(i) } else { None })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn percentile_interpolates_between_order_statistics() {
        let values = array![[1.0, 2.0], [3.0, 4.0]];
        assert_eq!(score_at_percentile(&values, 0.0).unwrap(), 1.0);
        assert_eq!(score_at_percentile(&values, 100.0).unwrap(), 4.0);
        assert!((score_at_percentile(&values, 50.0).unwrap() - 2.5).abs() < 1e-12);
    }

    #[test]
    fn percentile_out_of_range_is_rejected() {
        let values = array![[1.0, 2.0]];
        assert!(score_at_percentile(&values, 100.5).is_err());
        assert!(score_at_percentile(&values, -1.0).is_err());
    }

    #[test]
    fn mask_keeps_shape_and_excludes_values_above_bound() {
        let values = array![[1.0, 10.0, 3.0], [20.0, 30.0, 40.0]];
        let mask = TrimMask::mask_greater(&values, 5.0);
        assert_eq!(mask.valid.dim(), (2, 3));
        assert_eq!(mask.n_masked(), 4);
        assert_eq!(mask.row_sums(&values), array![4.0, 0.0]);
        assert_eq!(mask.row_counts(), array![2, 0]);
        assert_eq!(mask.row_means(&values), array![2.0, 0.0]);
        assert_eq!(mask.fully_masked_rows(), vec![1]);
    }

    #[test]
    fn value_equal_to_bound_is_kept() {
        let values = array![[5.0, 6.0]];
        let mask = TrimMask::mask_greater(&values, 5.0);
        assert_eq!(mask.row_counts(), array![1]);
    }

    #[test]
    fn negative_counts_are_rejected() {
        let values = array![[1.0_f64, -2.0]];
        assert!(validated_counts(&values).is_err());
    }
}
